//! Download task queue
//!
//! A bounded channel between the producer that materialises the shuffled
//! link list and the worker pool. Capacity is a small multiple of the worker
//! count so the producer never runs far ahead of the downloads.

pub mod core;
pub mod types;


pub use core::{task_queue, TaskProducer, TaskQueue};
pub use types::{temp_path_for, url_basename, DownloadTask};
