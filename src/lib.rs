pub mod aggregate;
pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod publish;

#[cfg(test)]
pub(crate) mod test_support;
