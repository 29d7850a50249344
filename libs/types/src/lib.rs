//! # State Relay Types
//!
//! Value model shared by the envelope codec, the relay queues and the
//! monitor facade.
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{StateMessage, Tensor};
//!
//! let pose = Tensor::from_slice(vec![2, 2], &[1.0f32, 0.0, 0.0, 1.0])?;
//! let msg = StateMessage::new()
//!     .with("step", 42)?
//!     .with("pose", pose)?;
//! assert_eq!(msg.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Invariants
//!
//! - A [`Tensor`] buffer length always equals `product(shape) * dtype.width()`
//! - A [`StateMessage`] never contains [`SENTINEL_KEY`]

pub mod error;
pub mod message;
pub mod tensor;
pub mod value;

pub use error::{MessageError, TensorError};
pub use message::{StateMessage, SENTINEL_KEY, SENTINEL_VALUE};
pub use tensor::{DType, Element, Tensor};
pub use value::Value;
