//! End-to-end passkey login flows driven through the controller against the
//! in-memory transaction source.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

use flowgate::audit::AuditEventKind;
use flowgate::config::{FlowConfig, PasskeyConfig};
use flowgate::flow::{
    ErrorCode, FlowController, FlowError, FlowInstance, FlowStore, HttpContext, MemoryStore,
    MemoryTx, Stash, StashKey, TransactionSource,
};
use flowgate::steps::{
    LOGIN_METHOD_PASSKEY, REGISTER_CLIENT_CAPABILITIES, RegisterClientCapabilities,
    WEBAUTHN_GENERATE_REQUEST_OPTIONS, WEBAUTHN_VERIFY_ASSERTION_RESPONSE,
    WebauthnGenerateRequestOptions, WebauthnVerifyAssertionResponse,
};
use flowgate::verification::{
    CredentialRejection, Principal, RequestOptions, SessionReference, VerificationOutcome,
    VerificationService,
};

#[derive(Clone)]
enum Verdict {
    Accept(Principal),
    Reject(CredentialRejection, Option<Principal>),
    Down,
}

struct StubVerifier {
    verdict: Verdict,
    seen: Mutex<Vec<(String, String)>>,
}

impl StubVerifier {
    fn new(verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VerificationService<MemoryTx> for StubVerifier {
    async fn generate_request_options(&self, _tx: &mut MemoryTx) -> Result<RequestOptions> {
        Ok(RequestOptions {
            session: SessionReference::new("session-1"),
            options: json!({"publicKey": {"challenge": "Y2hhbGxlbmdl"}}),
        })
    }

    async fn verify_assertion_response(
        &self,
        _tx: &mut MemoryTx,
        session: &SessionReference,
        response: &str,
    ) -> VerificationOutcome {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((session.to_string(), response.to_string()));
        }
        match self.verdict.clone() {
            Verdict::Accept(principal) => VerificationOutcome::Verified(principal),
            Verdict::Reject(cause, principal) => {
                VerificationOutcome::InvalidCredential { cause, principal }
            }
            Verdict::Down => VerificationOutcome::SystemError(anyhow!("verifier unreachable")),
        }
    }
}

fn alice() -> Principal {
    Principal {
        id: "user-alice".to_string(),
        has_password: true,
        webauthn_credentials: 2,
        username: Some("alice".to_string()),
        emails: Vec::new(),
    }
}

fn controller(
    store: &Arc<MemoryStore>,
    verifier: Arc<StubVerifier>,
    passkey: PasskeyConfig,
) -> FlowController<MemoryStore> {
    let verifier: Arc<dyn VerificationService<MemoryTx>> = verifier;
    FlowController::new(store.clone(), store.clone(), FlowConfig::default())
        .with_action(Arc::new(RegisterClientCapabilities))
        .with_action(Arc::new(WebauthnGenerateRequestOptions::new(
            passkey.clone(),
            verifier.clone(),
        )))
        .with_action(Arc::new(WebauthnVerifyAssertionResponse::new(
            passkey,
            verifier,
            store.clone(),
        )))
}

fn http() -> HttpContext {
    HttpContext {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("integration-test".to_string()),
        request_id: Some("req-7".to_string()),
    }
}

fn assertion() -> Value {
    json!({"assertion_response": {"id": "cred-1", "response": {"signature": "c2ln"}}})
}

/// Start a flow and run it up to the point where an assertion can be submitted.
async fn prepared_flow(controller: &FlowController<MemoryStore>) -> Result<uuid::Uuid> {
    let started = controller.start(Stash::new()).await?;
    let flow_id = started.flow_id;

    let registered = controller
        .execute(
            flow_id,
            REGISTER_CLIENT_CAPABILITIES.as_str(),
            json!({"webauthn_available": true}),
            &http(),
        )
        .await?;
    assert!(registered.error.is_none());

    let options = controller
        .execute(
            flow_id,
            WEBAUTHN_GENERATE_REQUEST_OPTIONS.as_str(),
            Value::Null,
            &http(),
        )
        .await?;
    assert_eq!(
        options.payload,
        Some(json!({"publicKey": {"challenge": "Y2hhbGxlbmdl"}}))
    );
    Ok(flow_id)
}

#[tokio::test]
async fn passkey_login_locks_the_flow() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Accept(alice()));
    let controller = controller(&store, verifier.clone(), PasskeyConfig::new());

    let flow_id = prepared_flow(&controller).await?;

    let response = controller
        .execute(
            flow_id,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await?;
    assert!(response.error.is_none());
    assert!(!response.revert_allowed);

    let seen = verifier.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "session-1");
    let submitted: Value = serde_json::from_str(&seen[0].1)?;
    assert_eq!(submitted["id"], "cred-1");

    let flow = store
        .flow(flow_id)
        .await
        .ok_or_else(|| anyhow!("flow was not committed"))?;
    let stash = flow.stash();
    assert_eq!(stash.text(StashKey::UserId)?, Some("user-alice"));
    assert_eq!(stash.text(StashKey::LoginMethod)?, Some(LOGIN_METHOD_PASSKEY));
    assert_eq!(stash.bool(StashKey::UserHasPassword)?, Some(true));
    assert_eq!(stash.bool(StashKey::UserHasWebauthnCredential)?, Some(true));
    assert_eq!(stash.bool(StashKey::UserHasUsername)?, Some(true));
    assert_eq!(stash.bool(StashKey::UserHasEmails)?, Some(false));
    assert_eq!(flow.history().len(), 3);
    assert!(store.audit_entries().await.is_empty());

    let back = controller.back(flow_id).await;
    assert!(matches!(back, Err(FlowError::RevertPrevented(id)) if id == flow_id));

    let after = store
        .flow(flow_id)
        .await
        .ok_or_else(|| anyhow!("flow disappeared"))?;
    assert_eq!(after, flow);
    Ok(())
}

#[tokio::test]
async fn login_steps_cannot_be_replayed_after_the_lock() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let controller = controller(
        &store,
        StubVerifier::new(Verdict::Accept(alice())),
        PasskeyConfig::new(),
    );
    let flow_id = prepared_flow(&controller).await?;

    let locked = controller
        .execute(
            flow_id,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await?;
    assert!(!locked.has_action(REGISTER_CLIENT_CAPABILITIES));
    assert!(!locked.has_action(WEBAUTHN_GENERATE_REQUEST_OPTIONS));
    assert!(!locked.has_action(WEBAUTHN_VERIFY_ASSERTION_RESPONSE));
    let flow = store
        .flow(flow_id)
        .await
        .ok_or_else(|| anyhow!("flow was not committed"))?;

    // a second identity must not be able to overwrite the logged in one
    let bob = Principal::new("user-bob");
    let verifier = StubVerifier::new(Verdict::Accept(bob));
    let replay = self::controller(&store, verifier.clone(), PasskeyConfig::new());
    for (action, input) in [
        (REGISTER_CLIENT_CAPABILITIES, json!({"webauthn_available": true})),
        (WEBAUTHN_GENERATE_REQUEST_OPTIONS, Value::Null),
        (WEBAUTHN_VERIFY_ASSERTION_RESPONSE, assertion()),
    ] {
        let refused = replay
            .execute(flow_id, action.as_str(), input, &http())
            .await?;
        assert_eq!(
            refused.error.map(|error| error.code),
            Some(ErrorCode::OperationNotPermitted)
        );
    }

    assert!(verifier.seen().is_empty());
    assert_eq!(store.flow(flow_id).await, Some(flow));
    let described = replay.describe(flow_id).await?;
    assert!(described.actions.is_empty());
    Ok(())
}

#[tokio::test]
async fn oversized_principal_rolls_back_without_locking() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let principal = Principal::new("x".repeat(flowgate::flow::stash::MAX_TEXT_LEN + 1));
    let controller = controller(
        &store,
        StubVerifier::new(Verdict::Accept(principal)),
        PasskeyConfig::new(),
    );
    let flow_id = prepared_flow(&controller).await?;
    let before = store.flow(flow_id).await;
    let rollbacks = store.rollbacks().await;

    let result = controller
        .execute(
            flow_id,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await;

    assert!(matches!(
        result,
        Err(FlowError::StashValueTooLong {
            key: StashKey::UserId,
            ..
        })
    ));
    assert_eq!(store.rollbacks().await, rollbacks + 1);
    assert_eq!(store.flow(flow_id).await, before);
    assert!(store.audit_entries().await.is_empty());
    assert!(controller.describe(flow_id).await?.revert_allowed);
    Ok(())
}

#[tokio::test]
async fn rejected_passkey_is_audited_and_leaves_the_flow_unchanged() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Reject(
        CredentialRejection::SignatureMismatch,
        Some(alice()),
    ));
    let controller = controller(&store, verifier, PasskeyConfig::new());

    let flow_id = prepared_flow(&controller).await?;
    let before = store
        .flow(flow_id)
        .await
        .ok_or_else(|| anyhow!("flow was not committed"))?;
    let commits = store.commits().await;

    let response = controller
        .execute(
            flow_id,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await?;

    assert!(response.revert_allowed);
    assert!(response.has_action(WEBAUTHN_VERIFY_ASSERTION_RESPONSE));
    let error = response.error.ok_or_else(|| anyhow!("expected a step error"))?;
    assert_eq!(error.code, ErrorCode::PasskeyInvalid);

    assert_eq!(store.commits().await, commits + 1);
    assert_eq!(store.flow(flow_id).await, Some(before));

    let entries = store.audit_entries().await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.kind, AuditEventKind::LoginFailure);
    assert_eq!(entry.principal_id.as_deref(), Some("user-alice"));
    assert_eq!(entry.error.as_deref(), Some("signature mismatch"));
    assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(entry.request_id.as_deref(), Some("req-7"));
    assert_eq!(entry.detail("login_method"), Some(LOGIN_METHOD_PASSKEY));
    assert_eq!(entry.detail("flow_id"), Some(flow_id.to_string().as_str()));

    // the client may still go back after a rejected attempt
    let back = controller.back(flow_id).await?;
    assert!(back.has_action(WEBAUTHN_GENERATE_REQUEST_OPTIONS));
    Ok(())
}

#[tokio::test]
async fn rejection_without_principal_is_still_audited() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Reject(
        CredentialRejection::UnknownCredential,
        None,
    ));
    let controller = controller(&store, verifier, PasskeyConfig::new());

    let flow_id = prepared_flow(&controller).await?;
    controller
        .execute(
            flow_id,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await?;

    let entries = store.audit_entries().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].principal_id.is_none());
    Ok(())
}

#[tokio::test]
async fn assertion_without_challenge_is_fatal() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Accept(alice()));
    let controller = controller(&store, verifier.clone(), PasskeyConfig::new());

    let flow_id = controller.start(Stash::new()).await?.flow_id;
    controller
        .execute(
            flow_id,
            REGISTER_CLIENT_CAPABILITIES.as_str(),
            json!({"webauthn_available": true}),
            &http(),
        )
        .await?;
    let before = store.flow(flow_id).await;
    let rollbacks = store.rollbacks().await;

    let result = controller
        .execute(
            flow_id,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await;

    assert!(matches!(
        result,
        Err(FlowError::MissingStashValue(StashKey::WebauthnSessionDataId))
    ));
    assert!(verifier.seen().is_empty());
    assert_eq!(store.rollbacks().await, rollbacks + 1);
    assert_eq!(store.flow(flow_id).await, before);
    assert!(store.audit_entries().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn verifier_outage_rolls_back() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Down);
    let controller = controller(&store, verifier, PasskeyConfig::new());

    let flow_id = prepared_flow(&controller).await?;
    let before = store.flow(flow_id).await;

    let result = controller
        .execute(
            flow_id,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await;

    let err = result.err().ok_or_else(|| anyhow!("expected a fatal error"))?;
    assert!(err.is_fatal());
    assert_eq!(err.code(), ErrorCode::TechnicalError);
    assert_eq!(store.flow(flow_id).await, before);
    assert!(store.audit_entries().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_assertion_is_a_form_error() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Accept(alice()));
    let controller = controller(&store, verifier.clone(), PasskeyConfig::new());

    let flow_id = prepared_flow(&controller).await?;
    let before = store.flow(flow_id).await;

    for input in [
        json!({}),
        json!({"assertion_response": "{not json"}),
        json!({"assertion_response": 42}),
    ] {
        let response = controller
            .execute(
                flow_id,
                WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
                input,
                &http(),
            )
            .await?;
        let error = response.error.ok_or_else(|| anyhow!("expected a form error"))?;
        assert_eq!(error.code, ErrorCode::FormDataInvalid);
        assert!(!error.field_errors.is_empty());
    }

    assert!(verifier.seen().is_empty());
    assert_eq!(store.flow(flow_id).await, before);
    Ok(())
}

#[tokio::test]
async fn passkey_steps_follow_client_capabilities() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Accept(alice()));
    let controller = controller(&store, verifier, PasskeyConfig::new());

    let started = controller.start(Stash::new()).await?;
    assert!(started.has_action(REGISTER_CLIENT_CAPABILITIES));
    assert!(!started.has_action(WEBAUTHN_GENERATE_REQUEST_OPTIONS));
    assert!(!started.has_action(WEBAUTHN_VERIFY_ASSERTION_RESPONSE));

    let unsupported = controller
        .execute(
            started.flow_id,
            REGISTER_CLIENT_CAPABILITIES.as_str(),
            json!({"webauthn_available": false}),
            &http(),
        )
        .await?;
    assert!(!unsupported.has_action(REGISTER_CLIENT_CAPABILITIES));
    assert!(!unsupported.has_action(WEBAUTHN_VERIFY_ASSERTION_RESPONSE));

    let refused = controller
        .execute(
            started.flow_id,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await?;
    let error = refused.error.ok_or_else(|| anyhow!("expected refusal"))?;
    assert_eq!(error.code, ErrorCode::OperationNotPermitted);

    // going back restores the empty stash and re-offers capability registration
    let back = controller.back(started.flow_id).await?;
    assert!(back.has_action(REGISTER_CLIENT_CAPABILITIES));
    let flow = store
        .flow(started.flow_id)
        .await
        .ok_or_else(|| anyhow!("flow was not committed"))?;
    assert!(flow.stash().is_empty());
    assert!(flow.history().is_empty());
    Ok(())
}

#[tokio::test]
async fn disabled_passkeys_are_never_offered() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Accept(alice()));
    let controller = controller(
        &store,
        verifier.clone(),
        PasskeyConfig::new().with_enabled(false),
    );

    let flow_id = controller.start(Stash::new()).await?.flow_id;
    let registered = controller
        .execute(
            flow_id,
            REGISTER_CLIENT_CAPABILITIES.as_str(),
            json!({"webauthn_available": true}),
            &http(),
        )
        .await?;
    assert!(!registered.has_action(WEBAUTHN_GENERATE_REQUEST_OPTIONS));

    let refused = controller
        .execute(
            flow_id,
            WEBAUTHN_GENERATE_REQUEST_OPTIONS.as_str(),
            Value::Null,
            &http(),
        )
        .await?;
    assert_eq!(
        refused.error.map(|error| error.code),
        Some(ErrorCode::OperationNotPermitted)
    );
    Ok(())
}

#[tokio::test]
async fn expired_and_unknown_flows_are_refused() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Accept(alice()));
    let controller = controller(&store, verifier, PasskeyConfig::new());

    let created_at = Utc::now() - Duration::hours(2);
    let expired = FlowInstance::from_parts(
        uuid::Uuid::new_v4(),
        Stash::new(),
        Vec::new(),
        true,
        created_at,
        created_at + Duration::hours(1),
    );
    let mut tx = store.begin().await?;
    store.save(&mut tx, &expired).await?;
    store.commit(tx).await?;

    assert!(matches!(
        controller.describe(expired.id()).await,
        Err(FlowError::Expired(_))
    ));
    assert!(matches!(
        controller
            .execute(
                expired.id(),
                REGISTER_CLIENT_CAPABILITIES.as_str(),
                json!({"webauthn_available": true}),
                &http(),
            )
            .await,
        Err(FlowError::Expired(_))
    ));
    assert!(matches!(
        controller.back(expired.id()).await,
        Err(FlowError::Expired(_))
    ));

    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        controller.describe(missing).await,
        Err(FlowError::NotFound(id)) if id == missing
    ));
    Ok(())
}

#[tokio::test]
async fn concurrent_flows_do_not_share_state() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let verifier = StubVerifier::new(Verdict::Accept(alice()));
    let controller = controller(&store, verifier, PasskeyConfig::new());

    let first = prepared_flow(&controller).await?;
    let second = controller.start(Stash::new()).await?.flow_id;

    controller
        .execute(
            first,
            WEBAUTHN_VERIFY_ASSERTION_RESPONSE.as_str(),
            assertion(),
            &http(),
        )
        .await?;

    let untouched = controller.describe(second).await?;
    assert!(untouched.revert_allowed);
    assert!(untouched.has_action(REGISTER_CLIENT_CAPABILITIES));
    let flow = store
        .flow(second)
        .await
        .ok_or_else(|| anyhow!("flow was not committed"))?;
    assert!(flow.stash().is_empty());
    Ok(())
}
