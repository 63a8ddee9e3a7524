//! Tool tables and the dispatcher.
//!
//! Exactly one primary profile is compiled in, selected by cargo
//! feature: `profile-coding` (default), `profile-iot`, or
//! `profile-robotics`. Every failure comes back as
//! `ToolOutput { is_error: true }`; tool failures are observations for
//! the model, not errors for the loop.

#[cfg(not(any(
    feature = "profile-coding",
    feature = "profile-iot",
    feature = "profile-robotics"
)))]
compile_error!("select a tool profile: profile-coding, profile-iot, or profile-robotics");

#[cfg(all(feature = "profile-coding", feature = "profile-iot"))]
compile_error!("tool profiles are mutually exclusive");
#[cfg(all(feature = "profile-coding", feature = "profile-robotics"))]
compile_error!("tool profiles are mutually exclusive");
#[cfg(all(feature = "profile-iot", feature = "profile-robotics"))]
compile_error!("tool profiles are mutually exclusive");

pub mod bridge;
pub mod dispatcher;
pub mod runtime;
pub mod shared;

#[cfg(feature = "profile-coding")]
pub mod coding;
#[cfg(feature = "profile-iot")]
pub mod iot;
#[cfg(feature = "profile-robotics")]
pub mod robotics;

#[cfg(feature = "profile-coding")]
pub(crate) use self::coding as profile;
#[cfg(feature = "profile-iot")]
pub(crate) use self::iot as profile;
#[cfg(feature = "profile-robotics")]
pub(crate) use self::robotics as profile;

pub use dispatcher::Dispatcher;
pub use runtime::ToolRuntime;

/// Name of the compiled-in profile.
pub fn profile_name() -> &'static str {
    profile::PROFILE_NAME
}
