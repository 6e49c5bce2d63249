pub mod audit;
pub mod configure;
pub mod lead;
pub mod modules;
pub mod secret;
pub mod validate;

mod dispatch;

pub use dispatch::dispatch;
