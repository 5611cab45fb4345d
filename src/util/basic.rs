// Plain string errors, for helpers whose callers wrap them with more context.
pub type SError = String;
