pub mod jd_client;

pub use jd_client::JdClient;
