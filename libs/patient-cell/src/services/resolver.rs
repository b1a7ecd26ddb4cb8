use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use calendar_cell::NormalizedEvent;

use crate::models::{MatchMethod, Patient, ResolveError, Therapist};

/// Recognised title prefixes, optionally followed by one delimiter.
/// "Sessão - Maria", "Session — John Doe", "Consulta: Ana", "Terapia com Rui".
fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:sess[aã]o|session|consulta|terapia)\b\s*(?:[-–—:|]|\bcom\b|\bwith\b)?\s*(?P<name>.*?)\s*$")
            .expect("title pattern is valid")
    })
}

/// Candidate patient name from an event title. Titles without a recognised
/// prefix are used whole. Internal whitespace is collapsed.
pub fn extract_patient_name(title: &str) -> Option<String> {
    let raw = match title_pattern().captures(title) {
        Some(caps) => caps.name("name").map(|m| m.as_str()).unwrap_or_default(),
        None => title,
    };

    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Emails that may identify the patient, most specific first: attendees that
/// are neither the creator, the organizer nor the therapist, then the creator
/// when the creator is not the therapist.
pub fn patient_candidate_emails(event: &NormalizedEvent, therapist_email: &str) -> Vec<String> {
    let therapist_email = therapist_email.trim().to_lowercase();
    let is_staff = |email: &str| {
        email == therapist_email
            || event.creator_email.as_deref() == Some(email)
            || event.organizer_email.as_deref() == Some(email)
    };

    let mut candidates: Vec<String> = Vec::new();
    for email in event.attendee_emails() {
        if !is_staff(email) && !candidates.iter().any(|c| c == email) {
            candidates.push(email.to_string());
        }
    }

    if let Some(creator) = event.creator_email.as_deref() {
        if creator != therapist_email && !candidates.iter().any(|c| c == creator) {
            candidates.push(creator.to_string());
        }
    }

    candidates
}

/// Two-stage lookup of the patient a calendar event refers to: attendee email
/// first, then the name carried in the title. Pure over its inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatientResolver;

impl PatientResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve<'a>(
        &self,
        event: &NormalizedEvent,
        therapist: &Therapist,
        patients: &'a [Patient],
    ) -> Result<(&'a Patient, MatchMethod), ResolveError> {
        let scoped = || patients.iter().filter(|p| p.therapist_id == therapist.id);

        let candidate_emails = patient_candidate_emails(event, &therapist.email);
        for email in &candidate_emails {
            if let Some(patient) = scoped().find(|p| p.has_email(email)) {
                debug!("Event {} resolved to patient {} by email", event.event_id, patient.id);
                return Ok((patient, MatchMethod::AttendeeEmail));
            }
        }

        let candidate_name = extract_patient_name(&event.summary);
        if let Some(name) = candidate_name.as_deref() {
            let wanted = name.to_lowercase();
            let matches: Vec<&Patient> = scoped()
                .filter(|p| {
                    p.name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase() == wanted
                })
                .collect();

            match matches.as_slice() {
                [patient] => {
                    debug!("Event {} resolved to patient {} by title", event.event_id, patient.id);
                    return Ok((*patient, MatchMethod::TitleName));
                }
                [] => {}
                many => {
                    return Err(ResolveError::AmbiguousName {
                        name: name.to_string(),
                        count: many.len(),
                    })
                }
            }
        }

        Err(ResolveError::NotFound {
            candidate_emails,
            candidate_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use calendar_cell::{EventStatus, NormalizedAttendee};
    use chrono::Utc;
    use uuid::Uuid;

    fn therapist() -> Therapist {
        Therapist {
            id: Uuid::new_v4(),
            name: "Ana Lima".to_string(),
            email: "ana@lvnotas.com".to_string(),
            google_calendar_id: Some("ana@lvnotas.com".to_string()),
        }
    }

    fn patient(therapist: &Therapist, name: &str, email: Option<&str>) -> Patient {
        Patient {
            id: Uuid::new_v4(),
            therapist_id: therapist.id,
            name: name.to_string(),
            email: email.map(str::to_string),
            phone: None,
            session_price: 20000,
            therapy_start_date: None,
            billing_start_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn event(summary: &str, creator: Option<&str>, attendees: &[&str]) -> NormalizedEvent {
        NormalizedEvent {
            event_id: "evt1".to_string(),
            status: EventStatus::Confirmed,
            starts_at: Utc::now(),
            all_day: false,
            summary: summary.to_string(),
            creator_email: creator.map(str::to_string),
            organizer_email: creator.map(str::to_string),
            attendees: attendees
                .iter()
                .map(|e| NormalizedAttendee {
                    email: e.to_string(),
                    response_status: None,
                })
                .collect(),
            updated: None,
        }
    }

    #[test]
    fn test_extract_patient_name_conventions() {
        assert_eq!(extract_patient_name("Sessão - Maria Souza").as_deref(), Some("Maria Souza"));
        assert_eq!(extract_patient_name("Session — John  Doe").as_deref(), Some("John Doe"));
        assert_eq!(extract_patient_name("sessao: Rui").as_deref(), Some("Rui"));
        assert_eq!(extract_patient_name("Terapia com Beatriz").as_deref(), Some("Beatriz"));
        assert_eq!(extract_patient_name("Consulta Pedro").as_deref(), Some("Pedro"));
        assert_eq!(extract_patient_name("  Maria Souza ").as_deref(), Some("Maria Souza"));
        assert_eq!(extract_patient_name("Sessão - "), None);
        assert_eq!(extract_patient_name(""), None);
        // Prefix must be a whole word
        assert_eq!(extract_patient_name("Consultas gerais").as_deref(), Some("Consultas gerais"));
    }

    #[test]
    fn test_candidate_emails_skip_staff() {
        let ev = event(
            "Sessão - Maria",
            Some("ana@lvnotas.com"),
            &["ana@lvnotas.com", "maria@example.com", "maria@example.com"],
        );
        assert_eq!(patient_candidate_emails(&ev, "ana@lvnotas.com"), vec!["maria@example.com"]);

        // Patient-created event with no attendees
        let ev = event("", Some("pat@x.com"), &[]);
        assert_eq!(patient_candidate_emails(&ev, "ana@lvnotas.com"), vec!["pat@x.com"]);
    }

    #[test]
    fn test_email_match_wins_over_title() {
        let t = therapist();
        let by_email = patient(&t, "Joana Reis", Some("joana@example.com"));
        let by_name = patient(&t, "Maria Souza", Some("maria@example.com"));
        let patients = vec![by_name.clone(), by_email.clone()];

        let ev = event("Sessão - Maria Souza", Some("ana@lvnotas.com"), &["joana@example.com"]);
        let (resolved, method) = PatientResolver::new().resolve(&ev, &t, &patients).unwrap();

        assert_eq!(resolved.id, by_email.id);
        assert_eq!(method, MatchMethod::AttendeeEmail);
    }

    #[test]
    fn test_title_name_is_case_insensitive() {
        let t = therapist();
        let maria = patient(&t, "Maria Souza", None);
        let patients = vec![maria.clone()];

        let ev = event("SESSÃO - maria souza", Some("ana@lvnotas.com"), &[]);
        let (resolved, method) = PatientResolver::new().resolve(&ev, &t, &patients).unwrap();

        assert_eq!(resolved.id, maria.id);
        assert_eq!(method, MatchMethod::TitleName);
    }

    #[test]
    fn test_patients_of_other_therapists_are_ignored() {
        let t = therapist();
        let other = therapist();
        let foreign = patient(&other, "Maria Souza", Some("maria@example.com"));
        let patients = vec![foreign];

        let ev = event("Sessão - Maria Souza", Some("ana@lvnotas.com"), &["maria@example.com"]);
        assert_matches!(
            PatientResolver::new().resolve(&ev, &t, &patients),
            Err(ResolveError::NotFound { candidate_name: Some(name), .. }) if name == "Maria Souza"
        );
    }

    #[test]
    fn test_ambiguous_name_is_not_resolved() {
        let t = therapist();
        let patients = vec![patient(&t, "Maria", None), patient(&t, "maria", None)];

        let ev = event("Sessão - Maria", Some("ana@lvnotas.com"), &[]);
        assert_matches!(
            PatientResolver::new().resolve(&ev, &t, &patients),
            Err(ResolveError::AmbiguousName { count: 2, .. })
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let t = therapist();
        let patients = vec![
            patient(&t, "Maria Souza", Some("maria@example.com")),
            patient(&t, "Rui Alves", Some("rui@example.com")),
        ];
        let ev = event("Sessão - Rui Alves", Some("ana@lvnotas.com"), &["maria@example.com"]);
        let resolver = PatientResolver::new();

        let first = resolver.resolve(&ev, &t, &patients).unwrap().0.id;
        for _ in 0..5 {
            assert_eq!(resolver.resolve(&ev, &t, &patients).unwrap().0.id, first);
        }
    }
}
