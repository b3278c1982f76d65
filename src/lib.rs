pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod response;
pub mod router;
pub mod state;

pub mod models {
    pub mod profile;
    pub mod session;
    pub mod signal;
    pub mod ticket;
    pub mod view;
}

pub mod repositories {
    pub mod profile;
    pub mod session;
}

pub mod services {
    pub mod blind_date;
    pub mod consensus;
    pub mod directory;
    pub mod icebreaker;
    pub mod match_queue;
    pub mod notify;
    pub mod relay;
    pub mod scheduler;
    pub mod session;
}

pub mod handlers {
    pub mod decisions;
    pub mod health;
    pub mod matching;
    pub mod signals;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod blind_date;
}
