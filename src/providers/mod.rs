pub mod bedrock;
mod http_errors;
pub mod sigv4;
