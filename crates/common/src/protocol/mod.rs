mod frame;
mod marker;
mod request;
mod response;

pub use frame::{frame, read_marker, read_payload, write_marker};
pub use marker::Marker;
pub use request::{Scheme, decode_request, encode_request};
pub use response::{decode_response, encode_response};
