pub mod normalize;
pub mod retry;
