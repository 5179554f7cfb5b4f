use crate::*;
use chrono::{DateTime, Utc};
use std::fmt;

pub const DUPLICATE_VOTE_ATTEMPT: &str = "duplicate_vote_attempt";
pub const EVIDENCE_CRYPTOGRAPHIC: &str = "cryptographic";

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FraudStatus {
    PendingReview,
    Triaged,
    Investigating,
    Escalated,
    ResolvedCleared,
    ResolvedConfirmedFraud,
    ResolvedSystemError,
}

impl FraudStatus {
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            FraudStatus::ResolvedCleared
                | FraudStatus::ResolvedConfirmedFraud
                | FraudStatus::ResolvedSystemError
        )
    }
}

impl fmt::Display for FraudStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FraudStatus::PendingReview => "pending_review",
            FraudStatus::Triaged => "triaged",
            FraudStatus::Investigating => "investigating",
            FraudStatus::Escalated => "escalated",
            FraudStatus::ResolvedCleared => "resolved_cleared",
            FraudStatus::ResolvedConfirmedFraud => "resolved_confirmed_fraud",
            FraudStatus::ResolvedSystemError => "resolved_system_error",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FraudAction {
    TakeCase,
    StartInvestigation,
    Escalate,
    ResolveCleared,
    ResolveConfirmedFraud,
    ResolveSystemError,
    Note,
}

impl FraudAction {
    /// Status a case moves to when this action is applied in `current`
    pub fn next_status(&self, current: FraudStatus) -> FraudStatus {
        match self {
            FraudAction::TakeCase => FraudStatus::Triaged,
            FraudAction::StartInvestigation => FraudStatus::Investigating,
            FraudAction::Escalate => FraudStatus::Escalated,
            FraudAction::ResolveCleared => FraudStatus::ResolvedCleared,
            FraudAction::ResolveConfirmedFraud => FraudStatus::ResolvedConfirmedFraud,
            FraudAction::ResolveSystemError => FraudStatus::ResolvedSystemError,
            FraudAction::Note => current,
        }
    }
}

impl std::str::FromStr for FraudAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown fraud review action: {}", s))
    }
}

/// Ledger payload opening a fraud case
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FraudFlag {
    pub flag_type: String,
    pub election_id: String,
    pub jurisdiction_id: String,
    pub nullifier: Hash256,
    pub evidence_strength: String,
    pub status: FraudStatus,
}

impl FraudFlag {
    pub fn duplicate_vote_attempt(election_id: &str, jurisdiction_id: &str, nullifier: Hash256) -> Self {
        FraudFlag {
            flag_type: DUPLICATE_VOTE_ATTEMPT.to_string(),
            election_id: election_id.to_string(),
            jurisdiction_id: jurisdiction_id.to_string(),
            nullifier,
            evidence_strength: EVIDENCE_CRYPTOGRAPHIC.to_string(),
            status: FraudStatus::PendingReview,
        }
    }
}

/// Ledger payload recording a reviewer action on a fraud case
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FraudFlagAction {
    pub case_id: Hash256,
    pub action: FraudAction,
    pub reviewer_id: String,
    pub from_status: FraudStatus,
    pub to_status: FraudStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FraudCaseAction {
    pub tx_id: Hash256,
    pub recorded_at: DateTime<Utc>,

    #[serde(flatten)]
    pub action: FraudFlagAction,
}

/// A fraud case as derived from the ledger
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FraudCase {
    pub case_id: Hash256,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: FraudStatus,
    pub flag_type: String,
    pub evidence_strength: String,
    pub election_id: String,
    pub jurisdiction_id: String,
    pub nullifier: Hash256,
    pub assigned_to: Option<String>,
    pub actions: Vec<FraudCaseAction>,
}

impl FraudCase {
    fn apply(&mut self, action: FraudCaseAction) {
        self.status = action.action.to_status;
        if let Some(assignee) = &action.action.assigned_to {
            self.assigned_to = Some(assignee.clone());
        }
        if action.recorded_at > self.updated_at {
            self.updated_at = action.recorded_at;
        }
        self.actions.push(action);
    }
}

/// A reviewer's request to act on a case
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FraudReview {
    pub case_id: Hash256,
    pub reviewer_id: String,
    pub action: FraudAction,

    #[serde(default)]
    pub reason_code: Option<String>,

    #[serde(default)]
    pub note: Option<String>,
}

/// Fold fraud_flag and fraud_flag_action events into cases, most recently updated first
pub fn derive_fraud_cases(ledger: &Ledger) -> Vec<FraudCase> {
    let mut cases: Vec<FraudCase> = ledger
        .events()
        .iter()
        .filter_map(|event| match &event.body {
            EventBody::FraudFlag(flag) => Some(FraudCase {
                case_id: event.tx_id,
                created_at: event.recorded_at,
                updated_at: event.recorded_at,
                status: flag.status,
                flag_type: flag.flag_type.clone(),
                evidence_strength: flag.evidence_strength.clone(),
                election_id: flag.election_id.clone(),
                jurisdiction_id: flag.jurisdiction_id.clone(),
                nullifier: flag.nullifier,
                assigned_to: None,
                actions: Vec::new(),
            }),
            _ => None,
        })
        .collect();

    let mut actions: Vec<FraudCaseAction> = ledger
        .events()
        .iter()
        .filter_map(|event| match &event.body {
            EventBody::FraudFlagAction(action) => Some(FraudCaseAction {
                tx_id: event.tx_id,
                recorded_at: event.recorded_at,
                action: action.clone(),
            }),
            _ => None,
        })
        .collect();
    actions.sort_by_key(|action| action.recorded_at);

    for action in actions {
        match cases.iter_mut().find(|case| case.case_id == action.action.case_id) {
            Some(case) => case.apply(action),
            None => warn!("fraud: action {} refers to unknown case {}", action.tx_id, action.action.case_id),
        }
    }

    cases.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    cases
}

/// Validate a review against the current case and append it to the ledger
pub fn review_fraud_case(
    ledger: &mut Ledger,
    ledger_key: &Keypair,
    review: FraudReview,
    now: DateTime<Utc>,
) -> Result<FraudCase, Error> {
    let reviewer_id = review.reviewer_id.trim();
    if reviewer_id.is_empty() {
        return Err(Error::MissingReviewer);
    }

    let case = derive_fraud_cases(ledger)
        .into_iter()
        .find(|case| case.case_id == review.case_id)
        .ok_or(Error::UnknownFraudCase(review.case_id))?;

    if case.status.is_resolved() && review.action != FraudAction::Note {
        return Err(Error::FraudCaseResolved(case.status));
    }

    let action = FraudFlagAction {
        case_id: case.case_id,
        action: review.action,
        reviewer_id: reviewer_id.to_string(),
        from_status: case.status,
        to_status: review.action.next_status(case.status),
        reason_code: review.reason_code,
        note: review.note,
        assigned_to: match review.action {
            FraudAction::TakeCase => Some(reviewer_id.to_string()),
            _ => None,
        },
    };
    info!(
        "fraud: case {} {} -> {} by {}",
        case.case_id, action.from_status, action.to_status, action.reviewer_id
    );
    ledger.append(ledger_key, EventBody::FraudFlagAction(action), now)?;

    derive_fraud_cases(ledger)
        .into_iter()
        .find(|updated| updated.case_id == case.case_id)
        .ok_or(Error::UnknownFraudCase(case.case_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn flagged_ledger() -> (Keypair, Ledger, Hash256, DateTime<Utc>) {
        let key = Keypair::generate(KeyRole::Ledger.default_kid());
        let mut ledger = Ledger::new();
        let now = Utc::now();
        let nullifier = tagged_hash(DOMAIN_NULLIFIER, &[b"voter"]);
        let flag = FraudFlag::duplicate_vote_attempt("poc-2026-demo", "poc_jurisdiction_hash_0x9c1d", nullifier);
        let case_id = ledger.append(&key, EventBody::FraudFlag(flag), now).unwrap().tx_id;
        (key, ledger, case_id, now)
    }

    fn review(case_id: Hash256, action: FraudAction) -> FraudReview {
        FraudReview {
            case_id,
            reviewer_id: "auditor-7".to_string(),
            action,
            reason_code: None,
            note: None,
        }
    }

    #[test]
    fn case_lifecycle() {
        let (key, mut ledger, case_id, now) = flagged_ledger();

        let cases = derive_fraud_cases(&ledger);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].status, FraudStatus::PendingReview);
        assert_eq!(cases[0].flag_type, DUPLICATE_VOTE_ATTEMPT);

        let case = review_fraud_case(&mut ledger, &key, review(case_id, FraudAction::TakeCase), now + Duration::seconds(1)).unwrap();
        assert_eq!(case.status, FraudStatus::Triaged);
        assert_eq!(case.assigned_to.as_deref(), Some("auditor-7"));

        let mut noted = review(case_id, FraudAction::Note);
        noted.note = Some("same nullifier from two devices".to_string());
        let case = review_fraud_case(&mut ledger, &key, noted, now + Duration::seconds(2)).unwrap();
        assert_eq!(case.status, FraudStatus::Triaged);

        let case = review_fraud_case(&mut ledger, &key, review(case_id, FraudAction::ResolveCleared), now + Duration::seconds(3)).unwrap();
        assert_eq!(case.status, FraudStatus::ResolvedCleared);
        assert_eq!(case.actions.len(), 3);
        assert_eq!(case.updated_at, now + Duration::seconds(3));

        // Only notes once resolved
        let err = review_fraud_case(&mut ledger, &key, review(case_id, FraudAction::Escalate), now + Duration::seconds(4)).unwrap_err();
        assert_eq!(err.to_string(), "votechain: Case is already resolved_cleared. Only notes are allowed.");
        review_fraud_case(&mut ledger, &key, review(case_id, FraudAction::Note), now + Duration::seconds(5)).unwrap();
    }

    #[test]
    fn rejected_reviews() {
        let (key, mut ledger, case_id, now) = flagged_ledger();

        let mut blank = review(case_id, FraudAction::TakeCase);
        blank.reviewer_id = "   ".to_string();
        assert!(matches!(review_fraud_case(&mut ledger, &key, blank, now), Err(Error::MissingReviewer)));

        let unknown = review(tagged_hash(DOMAIN_LEDGER_TX, &[b"nope"]), FraudAction::TakeCase);
        assert!(matches!(review_fraud_case(&mut ledger, &key, unknown, now), Err(Error::UnknownFraudCase(_))));

        // Nothing was appended
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn cases_sorted_by_update() {
        let (key, mut ledger, first, now) = flagged_ledger();
        let other = FraudFlag::duplicate_vote_attempt("poc-2026-demo", "poc_jurisdiction_hash_0x9c1d", tagged_hash(DOMAIN_NULLIFIER, &[b"other"]));
        let second = ledger.append(&key, EventBody::FraudFlag(other), now + Duration::seconds(1)).unwrap().tx_id;

        assert_eq!(derive_fraud_cases(&ledger)[0].case_id, second);

        review_fraud_case(&mut ledger, &key, review(first, FraudAction::StartInvestigation), now + Duration::seconds(2)).unwrap();
        let cases = derive_fraud_cases(&ledger);
        assert_eq!(cases[0].case_id, first);
        assert_eq!(cases[0].status, FraudStatus::Investigating);
    }

    #[test]
    fn parse_actions() {
        assert_eq!("take_case".parse::<FraudAction>().unwrap(), FraudAction::TakeCase);
        assert_eq!("resolve_confirmed_fraud".parse::<FraudAction>().unwrap(), FraudAction::ResolveConfirmedFraud);
        assert!("shred_evidence".parse::<FraudAction>().is_err());
    }
}
