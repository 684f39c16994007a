pub mod validator;

pub use validator::{
    validate_chat_message, validate_code_input, validate_system_instruction, ValidationError,
    MAX_CODE_INPUT_LENGTH, MAX_SYSTEM_INSTRUCTION_LENGTH,
};
