pub mod train_use_case;
pub mod valid_use_case;
