//! Checkout: plan synthesis and transactional execution.
//!
//! [`plan`] turns a (target, working) snapshot pair into a minimal ordered
//! [`CheckoutPlan`]; [`execute`] applies a plan to the working store
//! all-or-nothing.

pub mod execute;
pub mod plan;

pub use execute::{ExecutionEvent, ExecutionResult, execute};
pub use plan::{CheckoutPlan, ToolCall, build_checkout_plan};
