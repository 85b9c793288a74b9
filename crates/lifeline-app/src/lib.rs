//! Front-end core: who is signed in, which pages they may see, and the
//! victim, volunteer and admin flows on top of a [`Platform`].
//!
//! [`Platform`]: lifeline_platform::Platform

pub mod admin;
pub mod badges;
pub mod error;
pub mod identity;
pub mod live;
pub mod location;
pub mod notice;
pub mod notifications;
pub mod router;
pub mod validation;
pub mod victim;
pub mod volunteer;

pub use error::{AuthFailure, FlowError, SubmitError, ValidationError};
pub use identity::{IdentityContext, IdentityState, Principal};
pub use live::LiveList;
pub use notice::{Notice, NoticeKind};
