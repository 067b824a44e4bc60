pub mod event;
pub mod record;
