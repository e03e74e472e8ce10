pub mod agreement;
pub mod interval;
pub mod org;
pub mod tariff;

pub use agreement::{ProgramTerms, ServiceAgreement, ShiftTerms, SurchargeVintage};
pub use interval::{Direction, Interval, Sample, Unit};
pub use org::{Provider, ProviderKind, Utility};
pub use tariff::RateTariff;
