//! Cloud Phone (CPH)

pub mod phone;
pub mod server;

pub use phone::{BatchReport, CphPhoneController, FailedJob, PhoneAction, PhoneJob, PhoneWaits};
pub use server::{CphServerController, CphServerWaits, CreateServerRequest, Server};
