//! Typed storage for accounts and clinical records, persisted as JSON.
//!
//! The store is the defense-in-depth backstop for the invariants the
//! service layer also checks: account uniqueness and foreign-key existence
//! are re-verified on every insert, so a race between two callers can never
//! leave two users with the same username or a record pointing at a row
//! that does not exist.

use crate::models::{
    Appointment, AppointmentId, AppointmentStatus, BillId, Billing, BillingStatus, Doctor,
    DoctorId, HistoryId, MedicalHistory, Patient, PatientId, Prescription, PrescriptionId, Report,
    ReportId, User, UserId,
};
use crate::utils::input_validation::{EmailAddress, Username};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, ErrorKind::NotFound},
    path::PathBuf,
};
use thiserror::Error;

#[derive(Serialize, Deserialize, Default)]
pub struct Database {
    #[serde(skip)]
    path: Option<PathBuf>,
    users: HashMap<UserId, User>,
    patients: HashMap<PatientId, Patient>,
    doctors: HashMap<DoctorId, Doctor>,
    appointments: HashMap<AppointmentId, Appointment>,
    histories: HashMap<HistoryId, MedicalHistory>,
    prescriptions: HashMap<PrescriptionId, Prescription>,
    reports: HashMap<ReportId, Report>,
    bills: HashMap<BillId, Billing>,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),
    #[error("Unknown patient: {0}")]
    UnknownPatient(PatientId),
    #[error("Unknown doctor: {0}")]
    UnknownDoctor(DoctorId),
    #[error("Unknown appointment: {0}")]
    UnknownAppointment(AppointmentId),
    #[error("Unknown bill: {0}")]
    UnknownBill(BillId),
    #[error("Username or email already exists")]
    DuplicateUser,
    #[error("Registration number already exists: {0}")]
    DuplicateRegistrationNumber(String),
    #[error("Storage unavailable, please try again later")]
    Unavailable(#[from] io::Error),
}

impl Database {
    /// Opens the database at the given path, creating an empty one if the
    /// file does not exist yet.
    pub fn open(path: PathBuf) -> Result<Self, DbError> {
        match File::open(&path) {
            Ok(f) => {
                let mut db: Self = serde_json::from_reader(f).map_err(io::Error::from)?;
                db.path = Some(path);
                Ok(db)
            }

            Err(not_found) if not_found.kind() == NotFound => {
                info!("DB file not found, creating new empty DB");
                let mut new_db = Database::default();
                new_db.path = Some(path);

                // Write-check immediately so a bad path fails at open time,
                // not on the first registration.
                new_db.save()?;
                Ok(new_db)
            }

            Err(other) => Err(other.into()),
        }
    }

    /// An in-memory database that never touches the filesystem.
    pub fn in_memory() -> Self {
        Database::default()
    }

    fn save(&self) -> Result<(), DbError> {
        if let Some(path) = &self.path {
            let file = File::create(path)?;
            serde_json::to_writer_pretty(file, self).map_err(io::Error::from)?;
        }
        Ok(())
    }

    // --- users ---

    pub fn get_user(&self, user: UserId) -> Result<&User, DbError> {
        self.users.get(&user).ok_or(DbError::UnknownUser(user))
    }

    pub fn lookup_username(&self, name: &Username) -> Option<&User> {
        self.users.values().find(|user| &user.username == name)
    }

    /// Combined uniqueness lookup used by registration: true if either the
    /// username or the email is already taken.
    pub fn credential_taken(&self, name: &Username, email: &EmailAddress) -> bool {
        self.users
            .values()
            .any(|user| &user.username == name || &user.email == email)
    }

    pub fn store_user(&mut self, user: User) -> Result<(), DbError> {
        if self.credential_taken(&user.username, &user.email) {
            return Err(DbError::DuplicateUser);
        }
        let id = user.id;
        self.users.insert(id, user);
        if let Err(e) = self.save() {
            // The insert must not outlive a failed save: a phantom row
            // would turn a retry into a spurious Duplicate.
            self.users.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    // --- patients and doctors ---

    pub fn get_patient(&self, patient: PatientId) -> Result<&Patient, DbError> {
        self.patients
            .get(&patient)
            .ok_or(DbError::UnknownPatient(patient))
    }

    pub fn get_doctor(&self, doctor: DoctorId) -> Result<&Doctor, DbError> {
        self.doctors
            .get(&doctor)
            .ok_or(DbError::UnknownDoctor(doctor))
    }

    pub fn store_patient(&mut self, patient: Patient) -> Result<(), DbError> {
        if self
            .patients
            .values()
            .any(|p| p.registration_number == patient.registration_number)
        {
            return Err(DbError::DuplicateRegistrationNumber(
                patient.registration_number,
            ));
        }
        if let Some(user_id) = patient.user_id {
            self.get_user(user_id)?;
        }
        let id = patient.id;
        self.patients.insert(id, patient);
        if let Err(e) = self.save() {
            self.patients.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    pub fn store_doctor(&mut self, doctor: Doctor) -> Result<(), DbError> {
        if let Some(user_id) = doctor.user_id {
            self.get_user(user_id)?;
        }
        let id = doctor.id;
        self.doctors.insert(id, doctor);
        if let Err(e) = self.save() {
            self.doctors.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    pub fn list_patients(&self) -> impl Iterator<Item = &Patient> + '_ {
        self.patients.values()
    }

    pub fn list_doctors(&self) -> impl Iterator<Item = &Doctor> + '_ {
        self.doctors.values()
    }

    // --- dependent clinical records ---

    pub fn store_appointment(&mut self, appointment: Appointment) -> Result<(), DbError> {
        self.get_patient(appointment.patient_id)?;
        self.get_doctor(appointment.doctor_id)?;
        let id = appointment.id;
        self.appointments.insert(id, appointment);
        if let Err(e) = self.save() {
            self.appointments.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    pub fn set_appointment_status(
        &mut self,
        appointment: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<(), DbError> {
        let slot = self
            .appointments
            .get_mut(&appointment)
            .ok_or(DbError::UnknownAppointment(appointment))?;
        let previous = std::mem::replace(&mut slot.status, status);
        if let Err(e) = self.save() {
            if let Some(slot) = self.appointments.get_mut(&appointment) {
                slot.status = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn store_history(&mut self, history: MedicalHistory) -> Result<(), DbError> {
        self.get_patient(history.patient_id)?;
        let id = history.id;
        self.histories.insert(id, history);
        if let Err(e) = self.save() {
            self.histories.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    pub fn store_prescription(&mut self, prescription: Prescription) -> Result<(), DbError> {
        self.get_patient(prescription.patient_id)?;
        self.get_doctor(prescription.doctor_id)?;
        let id = prescription.id;
        self.prescriptions.insert(id, prescription);
        if let Err(e) = self.save() {
            self.prescriptions.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    pub fn store_report(&mut self, report: Report) -> Result<(), DbError> {
        self.get_patient(report.patient_id)?;
        let id = report.id;
        self.reports.insert(id, report);
        if let Err(e) = self.save() {
            self.reports.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    pub fn store_billing(&mut self, bill: Billing) -> Result<(), DbError> {
        self.get_patient(bill.patient_id)?;
        let id = bill.id;
        self.bills.insert(id, bill);
        if let Err(e) = self.save() {
            self.bills.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    pub fn set_billing_status(&mut self, bill: BillId, status: BillingStatus) -> Result<(), DbError> {
        let slot = self.bills.get_mut(&bill).ok_or(DbError::UnknownBill(bill))?;
        let previous = std::mem::replace(&mut slot.status, status);
        if let Err(e) = self.save() {
            if let Some(slot) = self.bills.get_mut(&bill) {
                slot.status = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    // --- filtered reads for dashboards ---

    pub fn appointments_for_patient(&self, patient: PatientId) -> Vec<&Appointment> {
        let mut found: Vec<&Appointment> = self
            .appointments
            .values()
            .filter(|a| a.patient_id == patient)
            .collect();
        found.sort_by_key(|a| a.scheduled_at);
        found
    }

    pub fn appointments_for_doctor(&self, doctor: DoctorId) -> Vec<&Appointment> {
        let mut found: Vec<&Appointment> = self
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor)
            .collect();
        found.sort_by_key(|a| a.scheduled_at);
        found
    }

    pub fn history_for_patient(&self, patient: PatientId) -> Vec<&MedicalHistory> {
        let mut found: Vec<&MedicalHistory> = self
            .histories
            .values()
            .filter(|h| h.patient_id == patient)
            .collect();
        found.sort_by_key(|h| h.recorded_at);
        found
    }

    pub fn prescriptions_for_patient(&self, patient: PatientId) -> Vec<&Prescription> {
        let mut found: Vec<&Prescription> = self
            .prescriptions
            .values()
            .filter(|p| p.patient_id == patient)
            .collect();
        found.sort_by_key(|p| p.issued_at);
        found
    }

    pub fn reports_for_patient(&self, patient: PatientId) -> Vec<&Report> {
        let mut found: Vec<&Report> = self
            .reports
            .values()
            .filter(|r| r.patient_id == patient)
            .collect();
        found.sort_by_key(|r| r.test_date);
        found
    }

    pub fn bills_for_patient(&self, patient: PatientId) -> Vec<&Billing> {
        let mut found: Vec<&Billing> = self
            .bills
            .values()
            .filter(|b| b.patient_id == patient)
            .collect();
        found.sort_by_key(|b| b.issued_at);
        found
    }
}
