mod aggregate;
mod snapshot;

pub use aggregate::MonthlyAggregate;
pub use snapshot::NewSnapshot;
