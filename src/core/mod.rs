pub mod correlation;
pub mod equity_curve;
pub mod kelly;
pub mod monte_carlo;
pub mod returns;
