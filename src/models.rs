//! Data model: accounts, clinical entities and their identifiers.

use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as EnumDisplay, EnumString};
use uuid::Uuid;

use crate::utils::input_validation::{EmailAddress, Username};
use crate::utils::password_utils::PasswordHash;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
        )]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

entity_id!(
    /// Unique identifier of a user account.
    UserId
);
entity_id!(
    /// Unique identifier of a patient record.
    PatientId
);
entity_id!(
    /// Unique identifier of a doctor record.
    DoctorId
);
entity_id!(AppointmentId);
entity_id!(HistoryId);
entity_id!(PrescriptionId);
entity_id!(ReportId);
entity_id!(BillId);

/// Role of a user account: admin, doctor or patient.
///
/// Parsed case-insensitively from its lowercase string form, which is the
/// form the registration endpoint receives.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumDisplay,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

/// Status of an appointment.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, EnumString, EnumDisplay,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

/// Status of a bill.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, EnumString, EnumDisplay,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BillingStatus {
    Pending,
    Paid,
}

/// A user account. The password is stored only as a PHC hash string,
/// plaintext never reaches this struct.
#[derive(Debug, Serialize, Deserialize, Clone, Display)]
#[display("{username}")]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: EmailAddress,
    pub password: PasswordHash,
    pub role: Role,
    pub is_active: bool,
}

/// The authenticated identity resolved from a session.
///
/// Carries everything the embedding layer needs to render for the logged-in
/// user, and nothing secret.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Display)]
#[display("{username} ({role})")]
pub struct Principal {
    pub id: UserId,
    pub username: Username,
    pub email: EmailAddress,
    pub role: Role,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Principal {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// A clinical subject. May be linked to a user account, but admin and
/// doctor accounts exist without one.
#[derive(Debug, Serialize, Deserialize, Clone, Display)]
#[display("{registration_number}")]
pub struct Patient {
    pub id: PatientId,
    pub registration_number: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub user_id: Option<UserId>,
}

/// A clinical provider.
#[derive(Debug, Serialize, Deserialize, Clone, Display)]
#[display("{first_name} {last_name}")]
pub struct Doctor {
    pub id: DoctorId,
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    pub phone: String,
    pub email: String,
    pub user_id: Option<UserId>,
}

/// Binds exactly one patient and one doctor at a point in time.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: String,
}

/// A past diagnosis and treatment entry in a patient's file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MedicalHistory {
    pub id: HistoryId,
    pub patient_id: PatientId,
    pub recorded_at: DateTime<Utc>,
    pub diagnosis: String,
    pub treatment: String,
    pub notes: String,
}

/// A prescription issued by a doctor for a patient.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub issued_at: DateTime<Utc>,
    pub medication: String,
    pub dosage: String,
    pub instructions: String,
}

/// A test result attached to a patient's file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Report {
    pub id: ReportId,
    pub patient_id: PatientId,
    pub test_name: String,
    pub test_date: DateTime<Utc>,
    pub result: String,
    pub notes: String,
}

/// A bill issued to a patient.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Billing {
    pub id: BillId,
    pub patient_id: PatientId,
    pub amount: f64,
    pub issued_at: DateTime<Utc>,
    pub status: BillingStatus,
    pub description: String,
}
