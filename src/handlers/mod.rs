pub mod api;
pub mod test;

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
