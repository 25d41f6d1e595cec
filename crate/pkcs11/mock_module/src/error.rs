use cosmian_pkcs11_sys::{
    CK_ATTRIBUTE_TYPE, CK_MECHANISM_TYPE, CK_OBJECT_HANDLE, CK_RV, CK_SESSION_HANDLE, CK_SLOT_ID,
    CK_USER_TYPE, CKR_ARGUMENTS_BAD, CKR_ATTRIBUTE_SENSITIVE, CKR_ATTRIBUTE_TYPE_INVALID,
    CKR_ATTRIBUTE_VALUE_INVALID, CKR_BUFFER_TOO_SMALL, CKR_CRYPTOKI_ALREADY_INITIALIZED,
    CKR_CRYPTOKI_NOT_INITIALIZED, CKR_FUNCTION_NOT_PARALLEL, CKR_FUNCTION_NOT_SUPPORTED,
    CKR_GENERAL_ERROR, CKR_MECHANISM_INVALID, CKR_NO_EVENT, CKR_OBJECT_HANDLE_INVALID,
    CKR_OPERATION_ACTIVE, CKR_OPERATION_NOT_INITIALIZED, CKR_PIN_INCORRECT,
    CKR_SESSION_HANDLE_INVALID, CKR_SESSION_PARALLEL_NOT_SUPPORTED, CKR_SLOT_ID_INVALID,
    CKR_TEMPLATE_INCOMPLETE, CKR_TOKEN_NOT_PRESENT, CKR_USER_ALREADY_LOGGED_IN,
    CKR_USER_NOT_LOGGED_IN, CKR_USER_TYPE_INVALID,
};
use thiserror::Error;

pub type MockResult<T> = Result<T, MockError>;

#[derive(Error, Debug)]
pub enum MockError {
    #[error("bad arguments: {0}")]
    BadArguments(String),
    #[error("{0:#x} is not a valid attribute type for this object")]
    AttributeTypeInvalid(CK_ATTRIBUTE_TYPE),
    #[error("invalid value for attribute {0:#x}")]
    AttributeValueInvalid(CK_ATTRIBUTE_TYPE),
    #[error("attribute {0:#x} is sensitive")]
    AttributeSensitive(CK_ATTRIBUTE_TYPE),
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("cryptoki module has already been initialized")]
    CryptokiAlreadyInitialized,
    #[error("cryptoki module has not been initialized")]
    CryptokiNotInitialized,
    #[error("function not parallel")]
    FunctionNotParallel,
    #[error("function not supported")]
    FunctionNotSupported,
    #[error("{0:#x} is not a valid mechanism")]
    MechanismInvalid(CK_MECHANISM_TYPE),
    #[error("no slot event")]
    NoEvent,
    #[error("object {0} is invalid")]
    ObjectHandleInvalid(CK_OBJECT_HANDLE),
    #[error("an operation is already active in session {0}")]
    OperationActive(CK_SESSION_HANDLE),
    #[error("operation has not been initialized, session: {0}")]
    OperationNotInitialized(CK_SESSION_HANDLE),
    #[error("incorrect PIN")]
    PinIncorrect,
    #[error("session handle {0} is invalid")]
    SessionHandleInvalid(CK_SESSION_HANDLE),
    #[error("token does not support parallel sessions")]
    SessionParallelNotSupported,
    #[error("slot id {0} is invalid")]
    SlotIdInvalid(CK_SLOT_ID),
    #[error("the template misses attribute {0:#x}")]
    TemplateIncomplete(CK_ATTRIBUTE_TYPE),
    #[error("no token in slot {0}")]
    TokenNotPresent(CK_SLOT_ID),
    #[error("a user is already logged in")]
    UserAlreadyLoggedIn,
    #[error("no user is logged in")]
    UserNotLoggedIn,
    #[error("user type {0} is not supported")]
    UserTypeInvalid(CK_USER_TYPE),
    #[error("the token state lock is poisoned")]
    Poisoned,
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),
}

impl From<MockError> for CK_RV {
    fn from(e: MockError) -> Self {
        match e {
            MockError::BadArguments(_) => CKR_ARGUMENTS_BAD,
            MockError::AttributeTypeInvalid(_) => CKR_ATTRIBUTE_TYPE_INVALID,
            MockError::AttributeValueInvalid(_) => CKR_ATTRIBUTE_VALUE_INVALID,
            MockError::AttributeSensitive(_) => CKR_ATTRIBUTE_SENSITIVE,
            MockError::BufferTooSmall => CKR_BUFFER_TOO_SMALL,
            MockError::CryptokiAlreadyInitialized => CKR_CRYPTOKI_ALREADY_INITIALIZED,
            MockError::CryptokiNotInitialized => CKR_CRYPTOKI_NOT_INITIALIZED,
            MockError::FunctionNotParallel => CKR_FUNCTION_NOT_PARALLEL,
            MockError::FunctionNotSupported => CKR_FUNCTION_NOT_SUPPORTED,
            MockError::MechanismInvalid(_) => CKR_MECHANISM_INVALID,
            MockError::NoEvent => CKR_NO_EVENT,
            MockError::ObjectHandleInvalid(_) => CKR_OBJECT_HANDLE_INVALID,
            MockError::OperationActive(_) => CKR_OPERATION_ACTIVE,
            MockError::OperationNotInitialized(_) => CKR_OPERATION_NOT_INITIALIZED,
            MockError::PinIncorrect => CKR_PIN_INCORRECT,
            MockError::SessionHandleInvalid(_) => CKR_SESSION_HANDLE_INVALID,
            MockError::SessionParallelNotSupported => CKR_SESSION_PARALLEL_NOT_SUPPORTED,
            MockError::SlotIdInvalid(_) => CKR_SLOT_ID_INVALID,
            MockError::TemplateIncomplete(_) => CKR_TEMPLATE_INCOMPLETE,
            MockError::TokenNotPresent(_) => CKR_TOKEN_NOT_PRESENT,
            MockError::UserAlreadyLoggedIn => CKR_USER_ALREADY_LOGGED_IN,
            MockError::UserNotLoggedIn => CKR_USER_NOT_LOGGED_IN,
            MockError::UserTypeInvalid(_) => CKR_USER_TYPE_INVALID,
            MockError::Poisoned | MockError::TryFromInt(_) => CKR_GENERAL_ERROR,
        }
    }
}
