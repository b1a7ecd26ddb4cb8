pub mod resolver;

pub use resolver::{extract_patient_name, patient_candidate_emails, PatientResolver};
