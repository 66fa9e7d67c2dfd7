pub mod outbound;
pub mod scratchpad;
pub mod turn;
