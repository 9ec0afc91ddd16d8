mod loop_worker;
mod reloader;

pub use loop_worker::watch_loop;
pub use reloader::{ModelReloader, WatchOutcome};

#[cfg(test)]
pub(crate) use reloader::tests::ScriptedProvider;
