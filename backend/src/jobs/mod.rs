// Background Jobs
//
// Schedule-triggered workflows run from here. Jobs are scheduled using
// tokio-cron-scheduler and re-synced with the engine on a fixed interval.

pub mod scheduler;
