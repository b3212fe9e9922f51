use thiserror::Error;

use crate::config::{MAX_POST_LENGTH, MIN_PASSWORD_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("upload canceled")]
    Canceled,
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Malformed(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("auth/email-already-in-use")]
    EmailAlreadyInUse,
    #[error("auth/weak-password")]
    WeakPassword,
    #[error("auth/invalid-email")]
    InvalidEmail,
    #[error("auth/user-not-found")]
    UserNotFound,
    #[error("auth/wrong-password")]
    WrongPassword,
    #[error("auth/invalid-credential")]
    InvalidCredential,
    #[error("auth/too-many-requests")]
    TooManyRequests,
    #[error("auth/user-disabled")]
    UserDisabled,
    #[error("auth/internal-error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn sign_in_message(&self) -> String {
        match self {
            AuthError::UserNotFound => "No account found with this email address".to_string(),
            AuthError::WrongPassword => "Incorrect password. Please try again.".to_string(),
            AuthError::InvalidEmail => "Invalid email address format".to_string(),
            AuthError::InvalidCredential => {
                "Invalid email or password. Please check your credentials and try again.".to_string()
            }
            AuthError::TooManyRequests => {
                "Too many failed login attempts. Please try again later.".to_string()
            }
            AuthError::UserDisabled => "This account has been disabled".to_string(),
            other => format!("Login failed: {}", other),
        }
    }

    pub fn sign_up_message(&self) -> String {
        match self {
            AuthError::EmailAlreadyInUse => "This email is already registered".to_string(),
            AuthError::WeakPassword => "Password is too weak".to_string(),
            AuthError::InvalidEmail => "Please enter a valid email address".to_string(),
            _ => "Failed to create account".to_string(),
        }
    }
}

/// Input rejected on the client before any backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    EmptyContent(&'static str),
    #[error("Content exceeds {} characters", MAX_POST_LENGTH)]
    ContentTooLong,
    #[error("No file selected")]
    NoFileSelected,
    #[error("Invalid file type. Please select a JPG, PNG, GIF, or WebP image.")]
    InvalidImageType(String),
    #[error("File is too large. Maximum size is 5MB.")]
    ImageTooLarge(u64),
    #[error("All fields are required")]
    MissingFields,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password must be at least {} characters", MIN_PASSWORD_LENGTH)]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("You cannot follow yourself")]
    SelfFollow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("User not authenticated")]
    NotSignedIn,
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),
    #[error("The edit window for this item has closed")]
    EditWindowClosed,
    #[error("Failed to upload image. Please try again.")]
    Upload(BackendError),
}

impl AppError {
    /// Text suitable for a banner. Validation errors carry their own wording;
    /// everything else falls back to the message of the failed action.
    pub fn user_message(&self, action: Action) -> String {
        match self {
            AppError::Validation(err) => err.to_string(),
            AppError::Auth(err) if action == Action::SignIn => err.sign_in_message(),
            AppError::Auth(err) if action == Action::SignUp => err.sign_up_message(),
            AppError::EditWindowClosed | AppError::Upload(_) => self.to_string(),
            _ => action.failure_message().to_string(),
        }
    }
}

/// User-triggered operations, used to pick banner text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    PostTweet,
    DeleteTweet,
    EditTweet,
    LikeTweet,
    PostReply,
    DeleteReply,
    EditReply,
    LikeReply,
    UploadImage,
    Follow,
    SignIn,
    SignUp,
    SignOut,
}

impl Action {
    pub fn failure_message(&self) -> &'static str {
        match self {
            Action::PostTweet => "Failed to post tweet. Please try again.",
            Action::DeleteTweet => "Failed to delete tweet. Please try again.",
            Action::EditTweet => "Failed to edit tweet. Please try again.",
            Action::LikeTweet => "Failed to like tweet. Please try again.",
            Action::PostReply => "Failed to post reply. Please try again.",
            Action::DeleteReply => "Failed to delete reply. Please try again.",
            Action::EditReply => "Failed to edit reply. Please try again.",
            Action::LikeReply => "Failed to like reply. Please try again.",
            Action::UploadImage => "Failed to upload image. Please try again.",
            Action::Follow => "Failed to follow/unfollow. Please try again.",
            Action::SignIn => "Login failed",
            Action::SignUp => "Failed to create account",
            Action::SignOut => "Failed to sign out",
        }
    }
}
