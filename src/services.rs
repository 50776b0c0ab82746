//! Registration, login, sessions, and the gated entity operations.
//!
//! Every protected operation resolves the caller's session before touching
//! the store. Authorization is deliberately explicit: [`Service::require_authenticated`]
//! checks only that a live session exists, and callers that need a role
//! restriction compose [`Service::require_role`] on top.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use thiserror::Error;

use crate::config::Config;
use crate::db::{Database, DbError};
use crate::models::{
    Appointment, AppointmentId, AppointmentStatus, BillId, Billing, BillingStatus, Doctor,
    DoctorId, HistoryId, MedicalHistory, Patient, PatientId, Prescription, PrescriptionId,
    Principal, Report, ReportId, Role, User, UserId,
};
use crate::session::{MemorySessionStore, SessionStore, SessionToken};
use crate::utils::input_validation::{EmailAddress, Username};
use crate::utils::password_utils::{self, hash, verify};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username or wrong password. The message never reveals which.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// A protected operation was invoked without a live session.
    #[error("Authentication required")]
    Unauthenticated,

    /// The session is live but the principal lacks the required role.
    #[error("Insufficient privileges")]
    Forbidden,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("The {0} field is required")]
    MissingField(&'static str),

    #[error("The {0} field is not valid")]
    InvalidField(&'static str),

    #[error("Password must be at least 8 characters long")]
    WeakPassword,

    #[error("Username or email already exists")]
    Duplicate,

    #[error("Storage unavailable, please try again later")]
    Storage(#[source] DbError),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Fields for a new patient record. The store assigns the id.
pub struct NewPatient {
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

/// Fields for a new doctor record.
pub struct NewDoctor {
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    pub phone: String,
    pub email: String,
    pub user_id: Option<UserId>,
}

pub struct Service<S: SessionStore = MemorySessionStore> {
    db: Database,
    sessions: S,
}

impl Service<MemorySessionStore> {
    /// Opens the store configured in the environment with in-process
    /// sessions, the default for a single-instance deployment.
    pub fn open(config: &Config) -> Result<Self, DbError> {
        Ok(Service {
            db: Database::open(config.database_path.clone())?,
            sessions: MemorySessionStore::new(),
        })
    }
}

impl<S: SessionStore> Service<S> {
    pub fn new(db: Database, sessions: S) -> Self {
        Service { db, sessions }
    }

    // --- identity ---

    /// Registers a new account. Validation order matches what the caller
    /// can fix first: missing fields, weak password, malformed fields,
    /// then the combined username/email uniqueness check.
    ///
    /// The store re-checks uniqueness on insert, so a registration racing
    /// this one still produces exactly one success.
    pub fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<Principal, RegistrationError> {
        let username = required(username, "username")?;
        let email = required(email, "email")?;
        let role = required(role, "role")?;
        if password.is_empty() {
            return Err(RegistrationError::MissingField("password"));
        }

        if !password_utils::acceptable(password) {
            return Err(RegistrationError::WeakPassword);
        }

        let username = Username::try_from(username)
            .map_err(|_| RegistrationError::InvalidField("username"))?;
        let email =
            EmailAddress::try_from(email).map_err(|_| RegistrationError::InvalidField("email"))?;
        let role = Role::from_str(role).map_err(|_| RegistrationError::InvalidField("role"))?;

        if self.db.credential_taken(&username, &email) {
            return Err(RegistrationError::Duplicate);
        }

        let user = User {
            id: UserId::new(),
            username,
            email,
            password: hash(password),
            role,
            is_active: true,
        };
        let principal = Principal::from(&user);

        self.db.store_user(user).map_err(|e| match e {
            DbError::DuplicateUser => RegistrationError::Duplicate,
            other => RegistrationError::Storage(other),
        })?;

        info!("Account created for user {}", principal.username);
        Ok(principal)
    }

    /// Checks a username/password pair. The lookup is exact-match, and a
    /// missing account still costs one hash verification so response
    /// timing does not enumerate usernames.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        let user = Username::try_from(username)
            .ok()
            .and_then(|name| self.db.lookup_username(&name));

        let stored = user.map(|u| &u.password);
        if !verify(password, stored) {
            warn!("Failed login attempt for username {username:?}");
            return Err(AuthError::InvalidCredentials);
        }

        // verify() only succeeds when a stored hash was present.
        let user = user.unwrap();
        if !user.is_active {
            warn!("Login attempt on deactivated account {}", user.username);
            return Err(AuthError::InvalidCredentials);
        }

        Ok(Principal::from(user))
    }

    /// Authenticates and opens a session in one step.
    pub fn login(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(SessionToken, Principal), AuthError> {
        let principal = self.authenticate(username, password)?;
        let token = self.establish_session(&principal);
        Ok((token, principal))
    }

    pub fn establish_session(&mut self, principal: &Principal) -> SessionToken {
        info!("Session opened for user {}", principal.username);
        self.sessions.insert(principal.clone())
    }

    pub fn resolve_session(&self, token: &SessionToken) -> Option<Principal> {
        self.sessions.resolve(token)
    }

    pub fn end_session(&mut self, token: &SessionToken) {
        if let Some(principal) = self.sessions.resolve(token) {
            info!("Session closed for user {}", principal.username);
        }
        self.sessions.remove(token);
    }

    /// Gate for protected operations: fails before any protected logic
    /// runs when the token has no live session.
    pub fn require_authenticated(&self, token: &SessionToken) -> Result<Principal, AuthError> {
        self.resolve_session(token).ok_or(AuthError::Unauthenticated)
    }

    /// Gate for role-restricted operations, composed on top of the
    /// session check. Never implicit: operations that need it call it.
    pub fn require_role(&self, token: &SessionToken, role: Role) -> Result<Principal, AuthError> {
        let principal = self.require_authenticated(token)?;
        if principal.role != role {
            return Err(AuthError::Forbidden);
        }
        Ok(principal)
    }

    // --- entity operations, all session-gated ---

    pub fn add_patient(
        &mut self,
        token: &SessionToken,
        new: NewPatient,
    ) -> Result<PatientId, ServiceError> {
        self.require_authenticated(token)?;

        let patient = Patient {
            id: PatientId::new(),
            registration_number: new.registration_number,
            first_name: new.first_name,
            last_name: new.last_name,
            date_of_birth: new.date_of_birth,
            gender: new.gender,
            address: new.address,
            phone: new.phone,
            email: new.email,
            user_id: new.user_id,
        };
        let id = patient.id;
        self.db.store_patient(patient)?;
        Ok(id)
    }

    pub fn add_doctor(
        &mut self,
        token: &SessionToken,
        new: NewDoctor,
    ) -> Result<DoctorId, ServiceError> {
        self.require_authenticated(token)?;

        let doctor = Doctor {
            id: DoctorId::new(),
            first_name: new.first_name,
            last_name: new.last_name,
            specialization: new.specialization,
            phone: new.phone,
            email: new.email,
            user_id: new.user_id,
        };
        let id = doctor.id;
        self.db.store_doctor(doctor)?;
        Ok(id)
    }

    pub fn schedule_appointment(
        &mut self,
        token: &SessionToken,
        patient_id: PatientId,
        doctor_id: DoctorId,
        scheduled_at: DateTime<Utc>,
        notes: String,
    ) -> Result<AppointmentId, ServiceError> {
        self.require_authenticated(token)?;

        let appointment = Appointment {
            id: AppointmentId::new(),
            patient_id,
            doctor_id,
            scheduled_at,
            status: AppointmentStatus::Scheduled,
            notes,
        };
        let id = appointment.id;
        self.db.store_appointment(appointment)?;
        Ok(id)
    }

    pub fn set_appointment_status(
        &mut self,
        token: &SessionToken,
        appointment: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<(), ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.set_appointment_status(appointment, status)?)
    }

    pub fn add_medical_history(
        &mut self,
        token: &SessionToken,
        patient_id: PatientId,
        diagnosis: String,
        treatment: String,
        notes: String,
    ) -> Result<HistoryId, ServiceError> {
        self.require_authenticated(token)?;

        let history = MedicalHistory {
            id: HistoryId::new(),
            patient_id,
            recorded_at: Utc::now(),
            diagnosis,
            treatment,
            notes,
        };
        let id = history.id;
        self.db.store_history(history)?;
        Ok(id)
    }

    pub fn add_prescription(
        &mut self,
        token: &SessionToken,
        patient_id: PatientId,
        doctor_id: DoctorId,
        medication: String,
        dosage: String,
        instructions: String,
    ) -> Result<PrescriptionId, ServiceError> {
        self.require_authenticated(token)?;

        let prescription = Prescription {
            id: PrescriptionId::new(),
            patient_id,
            doctor_id,
            issued_at: Utc::now(),
            medication,
            dosage,
            instructions,
        };
        let id = prescription.id;
        self.db.store_prescription(prescription)?;
        Ok(id)
    }

    pub fn add_report(
        &mut self,
        token: &SessionToken,
        patient_id: PatientId,
        test_name: String,
        test_date: DateTime<Utc>,
        result: String,
        notes: String,
    ) -> Result<ReportId, ServiceError> {
        self.require_authenticated(token)?;

        let report = Report {
            id: ReportId::new(),
            patient_id,
            test_name,
            test_date,
            result,
            notes,
        };
        let id = report.id;
        self.db.store_report(report)?;
        Ok(id)
    }

    pub fn add_bill(
        &mut self,
        token: &SessionToken,
        patient_id: PatientId,
        amount: f64,
        description: String,
    ) -> Result<BillId, ServiceError> {
        self.require_authenticated(token)?;

        let bill = Billing {
            id: BillId::new(),
            patient_id,
            amount,
            issued_at: Utc::now(),
            status: BillingStatus::Pending,
            description,
        };
        let id = bill.id;
        self.db.store_billing(bill)?;
        Ok(id)
    }

    pub fn set_billing_status(
        &mut self,
        token: &SessionToken,
        bill: BillId,
        status: BillingStatus,
    ) -> Result<(), ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.set_billing_status(bill, status)?)
    }

    // --- session-gated reads for dashboards ---

    pub fn patient(
        &self,
        token: &SessionToken,
        patient: PatientId,
    ) -> Result<&Patient, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.get_patient(patient)?)
    }

    pub fn doctor(&self, token: &SessionToken, doctor: DoctorId) -> Result<&Doctor, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.get_doctor(doctor)?)
    }

    pub fn list_patients(&self, token: &SessionToken) -> Result<Vec<&Patient>, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.list_patients().collect())
    }

    pub fn list_doctors(&self, token: &SessionToken) -> Result<Vec<&Doctor>, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.list_doctors().collect())
    }

    pub fn appointments_for_patient(
        &self,
        token: &SessionToken,
        patient: PatientId,
    ) -> Result<Vec<&Appointment>, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.appointments_for_patient(patient))
    }

    pub fn appointments_for_doctor(
        &self,
        token: &SessionToken,
        doctor: DoctorId,
    ) -> Result<Vec<&Appointment>, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.appointments_for_doctor(doctor))
    }

    pub fn history_for_patient(
        &self,
        token: &SessionToken,
        patient: PatientId,
    ) -> Result<Vec<&MedicalHistory>, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.history_for_patient(patient))
    }

    pub fn prescriptions_for_patient(
        &self,
        token: &SessionToken,
        patient: PatientId,
    ) -> Result<Vec<&Prescription>, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.prescriptions_for_patient(patient))
    }

    pub fn reports_for_patient(
        &self,
        token: &SessionToken,
        patient: PatientId,
    ) -> Result<Vec<&Report>, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.reports_for_patient(patient))
    }

    pub fn bills_for_patient(
        &self,
        token: &SessionToken,
        patient: PatientId,
    ) -> Result<Vec<&Billing>, ServiceError> {
        self.require_authenticated(token)?;
        Ok(self.db.bills_for_patient(patient))
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, RegistrationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(RegistrationError::MissingField(field))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> Service<MemorySessionStore> {
        Service::new(Database::in_memory(), MemorySessionStore::new())
    }

    fn new_patient(registration_number: &str) -> NewPatient {
        NewPatient {
            registration_number: registration_number.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
            gender: "female".to_string(),
            address: "12 Engine Street".to_string(),
            phone: "555-0100".to_string(),
            email: "ada@example.com".to_string(),
            user_id: None,
        }
    }

    fn new_doctor() -> NewDoctor {
        NewDoctor {
            first_name: "Gregory".to_string(),
            last_name: "House".to_string(),
            specialization: "Diagnostics".to_string(),
            phone: "555-0101".to_string(),
            email: "house@example.com".to_string(),
            user_id: None,
        }
    }

    #[test]
    fn register_then_authenticate() {
        let mut service = service();

        let principal = service
            .register("alice", "alice@x.com", "password123", "patient")
            .unwrap();
        assert_eq!(principal.username.as_ref(), "alice");
        assert_eq!(principal.role, Role::Patient);

        let authenticated = service.authenticate("alice", "password123").unwrap();
        assert_eq!(authenticated, principal);
    }

    #[test]
    fn weak_password_creates_no_account() {
        let mut service = service();

        let result = service.register("alice", "alice@x.com", "short12", "patient");
        assert!(matches!(result, Err(RegistrationError::WeakPassword)));

        // No record was created, so even the right password fails.
        assert!(matches!(
            service.authenticate("alice", "short12"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let mut service = service();

        assert!(matches!(
            service.register("", "alice@x.com", "password123", "patient"),
            Err(RegistrationError::MissingField("username"))
        ));
        assert!(matches!(
            service.register("alice", "   ", "password123", "patient"),
            Err(RegistrationError::MissingField("email"))
        ));
        assert!(matches!(
            service.register("alice", "alice@x.com", "", "patient"),
            Err(RegistrationError::MissingField("password"))
        ));
        assert!(matches!(
            service.register("alice", "alice@x.com", "password123", ""),
            Err(RegistrationError::MissingField("role"))
        ));
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let mut service = service();

        assert!(matches!(
            service.register("a", "alice@x.com", "password123", "patient"),
            Err(RegistrationError::InvalidField("username"))
        ));
        assert!(matches!(
            service.register("alice", "not-an-email", "password123", "patient"),
            Err(RegistrationError::InvalidField("email"))
        ));
        assert!(matches!(
            service.register("alice", "alice@x.com", "password123", "superuser"),
            Err(RegistrationError::InvalidField("role"))
        ));
    }

    #[test]
    fn duplicate_username_or_email_is_rejected() {
        let mut service = service();
        service
            .register("alice", "alice@x.com", "password123", "patient")
            .unwrap();

        assert!(matches!(
            service.register("alice", "other@x.com", "password123", "patient"),
            Err(RegistrationError::Duplicate)
        ));
        assert!(matches!(
            service.register("bob", "alice@x.com", "password123", "doctor"),
            Err(RegistrationError::Duplicate)
        ));
    }

    #[test]
    fn wrong_password_and_unknown_user_fail_alike() {
        let mut service = service();
        service
            .register("alice", "alice@x.com", "password123", "patient")
            .unwrap();

        assert!(matches!(
            service.authenticate("alice", "wrongpass"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            service.authenticate("nobody", "password123"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn passwords_do_not_cross_accounts() {
        let mut service = service();
        service
            .register("alice", "alice@x.com", "alicesecret", "patient")
            .unwrap();
        service
            .register("bob", "bob@x.com", "bobsecret99", "doctor")
            .unwrap();

        assert!(service.authenticate("alice", "alicesecret").is_ok());
        assert!(matches!(
            service.authenticate("alice", "bobsecret99"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn session_lifecycle() {
        let mut service = service();
        service
            .register("alice", "alice@x.com", "password123", "patient")
            .unwrap();

        let (token, principal) = service.login("alice", "password123").unwrap();
        assert_eq!(service.resolve_session(&token), Some(principal.clone()));
        assert_eq!(service.require_authenticated(&token).unwrap(), principal);

        service.end_session(&token);
        assert_eq!(service.resolve_session(&token), None);
        assert!(matches!(
            service.require_authenticated(&token),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn role_check_composes_on_top_of_session_check() {
        let mut service = service();
        service
            .register("alice", "alice@x.com", "password123", "patient")
            .unwrap();
        let (token, _) = service.login("alice", "password123").unwrap();

        assert!(service.require_role(&token, Role::Patient).is_ok());
        assert!(matches!(
            service.require_role(&token, Role::Admin),
            Err(AuthError::Forbidden)
        ));

        service.end_session(&token);
        assert!(matches!(
            service.require_role(&token, Role::Patient),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn entity_operations_require_a_session() {
        let mut service = service();
        service
            .register("alice", "alice@x.com", "password123", "patient")
            .unwrap();

        let (token, _) = service.login("alice", "password123").unwrap();
        service.end_session(&token);

        let result = service.add_patient(&token, new_patient("REG-001"));
        assert!(matches!(
            result,
            Err(ServiceError::Auth(AuthError::Unauthenticated))
        ));
    }

    #[test]
    fn appointment_referential_integrity() {
        let mut service = service();
        service
            .register("alice", "alice@x.com", "password123", "admin")
            .unwrap();
        let (token, _) = service.login("alice", "password123").unwrap();

        let when = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();

        // Non-existent patient id fails.
        let doctor_id = service.add_doctor(&token, new_doctor()).unwrap();
        let result = service.schedule_appointment(
            &token,
            PatientId::new(),
            doctor_id,
            when,
            String::new(),
        );
        assert!(matches!(
            result,
            Err(ServiceError::Db(DbError::UnknownPatient(_)))
        ));

        // Valid patient and doctor ids succeed, and the appointment is
        // retrievable by patient id.
        let patient_id = service.add_patient(&token, new_patient("REG-001")).unwrap();
        let appointment_id = service
            .schedule_appointment(&token, patient_id, doctor_id, when, "checkup".to_string())
            .unwrap();

        let appointments = service.appointments_for_patient(&token, patient_id).unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(appointments[0].id, appointment_id);
        assert_eq!(appointments[0].status, AppointmentStatus::Scheduled);

        service
            .set_appointment_status(&token, appointment_id, AppointmentStatus::Completed)
            .unwrap();
        let appointments = service.appointments_for_doctor(&token, doctor_id).unwrap();
        assert_eq!(appointments[0].status, AppointmentStatus::Completed);
    }

    #[test]
    fn clinical_records_attach_to_their_patient() {
        let mut service = service();
        service
            .register("carol", "carol@x.com", "password123", "doctor")
            .unwrap();
        let (token, _) = service.login("carol", "password123").unwrap();

        let patient_id = service.add_patient(&token, new_patient("REG-002")).unwrap();
        let doctor_id = service.add_doctor(&token, new_doctor()).unwrap();

        service
            .add_medical_history(
                &token,
                patient_id,
                "flu".to_string(),
                "rest".to_string(),
                String::new(),
            )
            .unwrap();
        service
            .add_prescription(
                &token,
                patient_id,
                doctor_id,
                "paracetamol".to_string(),
                "500mg".to_string(),
                "twice a day".to_string(),
            )
            .unwrap();
        service
            .add_report(
                &token,
                patient_id,
                "blood panel".to_string(),
                Utc::now(),
                "normal".to_string(),
                String::new(),
            )
            .unwrap();
        let bill_id = service
            .add_bill(&token, patient_id, 120.0, "Consultation".to_string())
            .unwrap();

        assert_eq!(service.history_for_patient(&token, patient_id).unwrap().len(), 1);
        assert_eq!(
            service
                .prescriptions_for_patient(&token, patient_id)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(service.reports_for_patient(&token, patient_id).unwrap().len(), 1);

        let bills = service.bills_for_patient(&token, patient_id).unwrap();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].status, BillingStatus::Pending);

        service
            .set_billing_status(&token, bill_id, BillingStatus::Paid)
            .unwrap();
        let bills = service.bills_for_patient(&token, patient_id).unwrap();
        assert_eq!(bills[0].status, BillingStatus::Paid);
    }

    #[test]
    fn prescription_requires_existing_doctor() {
        let mut service = service();
        service
            .register("carol", "carol@x.com", "password123", "doctor")
            .unwrap();
        let (token, _) = service.login("carol", "password123").unwrap();
        let patient_id = service.add_patient(&token, new_patient("REG-003")).unwrap();

        let result = service.add_prescription(
            &token,
            patient_id,
            DoctorId::new(),
            "paracetamol".to_string(),
            "500mg".to_string(),
            String::new(),
        );
        assert!(matches!(
            result,
            Err(ServiceError::Db(DbError::UnknownDoctor(_)))
        ));
    }
}
