pub mod error;

pub mod config;

pub mod cache {
    pub mod cache_manager;
}

pub mod controller {
    pub mod event_loop;
    pub use event_loop::{EventLoop, NavEvent, NavUpdate, Notification};

    pub mod remote;
}

pub mod model {
    pub mod directory;
    pub use directory::Directory;

    pub mod viewport;

    pub mod matching;

    pub mod sort;

    pub mod selection;

    pub mod persistence;
}

pub mod fs {
    pub mod backend;
    pub mod copy_engine;
    pub mod dir_scanner;
    pub mod file_info;
}

pub mod tasks {
    pub mod file_ops_task;

    pub mod preview_task;

    pub mod size_task;
}

pub mod nav;

pub mod logging;
pub use logging::Logger;

pub mod util {
    pub mod humanize;
    pub mod paths;
}

pub use error::AppError;

pub use nav::{Navigator, Progress};
