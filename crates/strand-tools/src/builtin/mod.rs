pub mod http;
pub mod time;

pub use http::HttpRequestTool;
pub use time::CurrentTimeTool;
