pub mod catalog;
pub mod enums;
pub mod finance;
pub mod invoice;
pub mod money;
pub mod reservation;

pub use catalog::*;
pub use finance::*;
pub use invoice::*;
pub use money::Money;
pub use reservation::*;
