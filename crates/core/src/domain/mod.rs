pub mod business;
pub mod call_record;
pub mod negotiation;
pub mod requirements;
pub mod research;
