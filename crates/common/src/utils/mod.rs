mod headers;

pub use headers::{
    MAX_HEADERS, declared_body_len, is_framing_header, parsed_to_headers, strip_port, take_body,
    write_headers,
};
