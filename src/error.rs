use std::{error, fmt, result};

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location, and a message describing the failure.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Fatal(String, String),
    IOError(String, String),
    InvalidInput(String, String),
    InvalidFile(String, String),
    DecodeFail(String, String),
    FailCbor(String, String),
    BackendFail(String, String),
    ReadOnly(String, String),
    NoSuchCmpr(String, String),
    NoSuchImpl(String, String),
    NotANumber(String, String),
    IPCFail(String, String),
    ThreadFail(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            InvalidFile(p, msg) => write!(f, "{} InvalidFile: {}", p, msg),
            DecodeFail(p, msg) => write!(f, "{} DecodeFail: {}", p, msg),
            FailCbor(p, msg) => write!(f, "{} FailCbor: {}", p, msg),
            BackendFail(p, msg) => write!(f, "{} BackendFail: {}", p, msg),
            ReadOnly(p, msg) => write!(f, "{} ReadOnly: {}", p, msg),
            NoSuchCmpr(p, msg) => write!(f, "{} NoSuchCmpr: {}", p, msg),
            NoSuchImpl(p, msg) => write!(f, "{} NoSuchImpl: {}", p, msg),
            NotANumber(p, msg) => write!(f, "{} NotANumber: {}", p, msg),
            IPCFail(p, msg) => write!(f, "{} IPCFail: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
        }
    }
}

impl error::Error for Error {}
