pub mod shared;
pub mod validate;

pub mod prelude {
    pub use crate::shared::prelude::*;
    pub use crate::validate::prelude::*;
}
