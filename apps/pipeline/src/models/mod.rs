pub mod grant;
pub mod reporting;
