pub(crate) mod meta;
pub(crate) mod run;
pub(crate) mod validate;
