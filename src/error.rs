#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GenericError {
    Timeout,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    // General device errors
    Busy,
    UnknownModule,

    // Data plane errors
    UploadTooLarge,
    BufferTooSmall,
    Parse,

    // Hardware access
    Uart,
    IoPin,

    // Generic shared errors, e.g. from `core::`
    Generic(GenericError),
}

impl From<GenericError> for Error {
    fn from(e: GenericError) -> Self {
        Self::Generic(e)
    }
}

impl From<crate::hex::EncodeError> for Error {
    fn from(_: crate::hex::EncodeError) -> Self {
        Self::BufferTooSmall
    }
}
