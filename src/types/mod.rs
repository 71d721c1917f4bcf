pub mod callbacks;
pub mod data_type;
pub mod global_slot;
pub mod script_value;
pub mod user_data;

pub use callbacks::*;
pub use data_type::{DataType, DataTypeKind};
pub use global_slot::GlobalSlot;
pub use script_value::{ScriptString, Value};
pub use user_data::{UserData, UserDataStore, UserDataValue};
