pub mod client;
pub mod dkim;
pub mod message;

pub use dkim::{DkimError, DkimIdentity};
pub use message::{Attachment, BuiltMessage, Message, Priority, build, build_as, data_uri};
