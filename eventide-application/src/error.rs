use eventide_domain::error::EventError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] EventError),

    #[error("handler already registered: handler={name}")]
    AlreadyRegisteredHandler { name: String },
}
