pub mod belt;
pub mod belt_manager;
pub mod card_table;

pub use self::belt::Belt;
pub use self::belt_manager::{BeltManager, ConfigurationError};
pub use self::card_table::CardTable;
