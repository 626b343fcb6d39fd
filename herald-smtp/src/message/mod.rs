mod builder;
mod encoding;
mod model;

pub use builder::{BuiltMessage, build, build_as};
pub use encoding::{LINE_LENGTH, base64_lines, boundary, data_uri};
pub use model::{Attachment, Message, Priority};

pub(crate) use model::find_header;
