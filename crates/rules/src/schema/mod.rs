//! Rule schema types and the JSON codec.
//!
//! The serialized form is a single-member object whose key is the rule kind:
//!
//! ```json
//! {
//!   "threshold": {
//!     "rule_name": "simplethreshold",
//!     "target": "abc@fff",
//!     "element": "fff",
//!     "values": [{"low_critical": 30}, {"low_warning": 40},
//!                {"high_warning": 50}, {"high_critical": 60}],
//!     "results": [{"high_critical": {"action": ["EMAIL", "SMS"],
//!                                    "severity": "CRITICAL",
//!                                    "description": "..."}}],
//!     "evaluation": "fn main(v) { ... }"
//!   }
//! }
//! ```
//!
//! Unrecognized members are kept verbatim and written back on
//! serialization (the "trash" tolerance property).

mod codec;
mod kind;
mod outcome;
mod rule;

pub use codec::*;
pub use kind::*;
pub use outcome::*;
pub use rule::*;
