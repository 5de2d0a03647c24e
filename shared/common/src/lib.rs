pub use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

pub use cgmath;
pub use cgmath::{Rad, Zero};

pub use boolinator::Boolinator;
pub use itertools::Itertools;
pub use ::smallvec::{self, smallvec, SmallVec};
pub use thiserror::{self, Error};

pub use logging::prelude::*;
pub use logging::{self, slog_value_debug, slog_value_display};
pub use logging::prelude::{
    my_crit as crit, my_debug as debug, my_error as error, my_info as info, my_trace as trace,
    my_warn as warn,
};

pub mod newtype;

pub type F = f32;
pub type Vector3 = cgmath::Vector3<F>;
