pub mod buffer;
pub mod calendar;
pub mod history_cache;
pub mod merge;
pub mod resample;
pub mod warmup;
pub mod window;
