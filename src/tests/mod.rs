mod comment;
mod utils;
