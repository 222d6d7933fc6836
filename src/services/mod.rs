pub mod fanout;
pub mod push_sender;
pub mod store;

pub use fanout::*;
pub use push_sender::*;
pub use store::*;
