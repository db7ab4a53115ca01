use nfb_rs::NfbError;

pub const SUCCESS: i32 = 0;
/// Stopped before acquisition started
pub const ABORTED: i32 = nfb_rs::session::EXIT_ABORTED;
pub const CONFIG_ERROR: i32 = 2;
pub const STREAM_ERROR: i32 = 3;
pub const EXECUTION_ERROR: i32 = 4;

pub fn for_error(error: &NfbError) -> i32 {
    match error {
        NfbError::Configuration(_) | NfbError::Parse(_) => CONFIG_ERROR,
        NfbError::NoStreamFound(_) | NfbError::Connection(_) | NfbError::NoNewData(_) => {
            STREAM_ERROR
        }
        NfbError::Aborted(_) => ABORTED,
        NfbError::Processing(_) | NfbError::Io(_) => EXECUTION_ERROR,
    }
}
