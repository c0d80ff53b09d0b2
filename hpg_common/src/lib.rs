mod amount;
mod currency;
mod secret;

pub use amount::{Amount, AmountError};
pub use currency::{CurrencyCode, CurrencyCodeError};
pub use secret::Secret;
