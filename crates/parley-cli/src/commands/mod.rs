pub mod replay;
pub mod resolve;
