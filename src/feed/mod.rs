mod fetcher;
mod poller;

pub use fetcher::{FeedFetcher, FeedSource};
pub use poller::{PollReport, PollTrigger, Poller};
