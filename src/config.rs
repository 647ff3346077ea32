use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub enum ConfigTime {
    Second(u64),
    Millisecond(u64),
}

impl ConfigTime {
    fn to_duration(self) -> Duration {
        match self {
            Self::Second(n) => Duration::from_secs(n),
            Self::Millisecond(n) => Duration::from_millis(n),
        }
    }
}

impl From<ConfigTime> for Duration {
    fn from(time: ConfigTime) -> Self {
        time.to_duration()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub channel_capacity: usize,
    pub max_comment_len: usize,

    pub comment_poll_interval: ConfigTime,
    pub upload_reset_after_success: ConfigTime,
    pub upload_reset_after_error: ConfigTime,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        self.comment_poll_interval.into()
    }

    pub fn success_reset_delay(&self) -> Duration {
        self.upload_reset_after_success.into()
    }

    pub fn error_reset_delay(&self) -> Duration {
        self.upload_reset_after_error.into()
    }
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| ron::from_str(include_str!("../config/config.ron")).expect("Invalid config file"));
