pub mod keys;
pub mod migrations;
pub mod store;

pub use store::{PrefChange, PrefSubscription, PrefValue, PreferenceStore};
