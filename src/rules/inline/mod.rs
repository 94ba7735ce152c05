mod amount;
mod time_of_day;

pub use amount::AmountEvaluator;
pub use time_of_day::TimeOfDayEvaluator;
