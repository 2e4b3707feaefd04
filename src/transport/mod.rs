mod http_transport;

pub use http_transport::{strip_request_hop_headers, strip_response_hop_headers, HttpTransport};
