use std::io;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use warden_auth::{
    Action, Argon2Hasher, AuditEvent, AuditEventType, AuditSink, Client, CodeChallengeMethod,
    Credentials, GrantType, HasherConfig, Permission, PermissionResolver, ResourceType, Role,
    Session, TokenConfig, TokenGenerator, User, ValidationError, Validator, pkce,
};
use warden_core::Entity;

const REDIRECT: &str = "https://app.example.com/callback";
const PASSWORD: &str = "Sw0rdfish!2024";

#[derive(Default)]
struct Recorder(Mutex<Vec<AuditEvent>>);

impl AuditSink for Recorder {
    fn record(&self, event: &AuditEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn hasher() -> Argon2Hasher {
    Argon2Hasher::new(
        HasherConfig::default()
            .with_memory_kib(1024)
            .with_iterations(1)
            .with_parallelism(1),
    )
}

fn admin_role() -> Role {
    let now = Utc::now();
    let mut role = Role::new("client-admin", "manages OAuth clients", now);
    for action in [Action::Create, Action::Read] {
        role.add_permission(
            Permission::new(format!("client:{action}"), ResourceType::Client, action, "", now),
            now,
        );
    }
    role
}

#[test]
fn authorization_code_flow_with_pkce() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let audit = Arc::new(Recorder::default());
    let verifier = "M25iVXpKU3puUjFaYWg3T1NDTDQtcW1ROUY5YXlwalNoc0hhakxifmZHag";

    let (access_value, refresh_value) = tracing::subscriber::with_default(subscriber, || {
        let now = Utc::now();
        let hasher = hasher();
        let generator = TokenGenerator::new(TokenConfig::default()).with_audit(audit.clone());
        let validator = Validator::default();

        // registration and login
        let credentials = Credentials::new("carol@example.com", PASSWORD, &hasher).unwrap();
        let mut user = User::new(&credentials, "Carol", "Diaz", now);
        assert!(user.grant_role(admin_role(), &*audit, now));
        assert!(user.validate().is_ok());
        assert!(!user.authenticate("Sw0rdfish!2025", &hasher, &*audit, now));
        assert!(user.authenticate(PASSWORD, &hasher, &*audit, now));

        let secret = generator.generate_client_secret().unwrap();
        let client = Client::new(
            "dashboard",
            secret.clone(),
            vec![REDIRECT.into()],
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            vec!["read".into(), "write".into()],
            now,
        );
        assert!(client.validate().is_ok());
        assert!(client.verify_secret(&secret));

        // authorization request
        validator
            .validate_client(Some(&client), GrantType::AuthorizationCode)
            .unwrap();
        let challenge = pkce::s256_challenge(verifier);
        let mut code = generator
            .generate_auth_code(
                user.id,
                client.id,
                REDIRECT,
                &["read"],
                Some(&challenge),
                Some(CodeChallengeMethod::S256),
                now,
            )
            .unwrap();
        assert!(code.validate().is_ok());

        // token exchange
        let exchange_at = now + Duration::minutes(2);
        assert_eq!(
            validator.validate_auth_code(Some(&code), client.id, REDIRECT, Some("wrong-verifier"), exchange_at),
            Err(ValidationError::PkceMismatch)
        );
        validator
            .validate_auth_code(Some(&code), client.id, REDIRECT, Some(verifier), exchange_at)
            .unwrap();
        assert!(code.mark_used());
        assert_eq!(
            validator.validate_auth_code(Some(&code), client.id, REDIRECT, Some(verifier), exchange_at),
            Err(ValidationError::Used)
        );

        let pair = generator
            .generate_token_pair(user.id, client.id, &code.scopes, exchange_at)
            .unwrap();
        validator.validate_token(Some(&pair.access), exchange_at).unwrap();
        validator.validate_scopes(Some(&pair.access), &["read"]).unwrap();
        assert_eq!(
            validator.validate_scopes(Some(&pair.access), &["write"]),
            Err(ValidationError::MissingScope("write".into()))
        );

        // session bound to the refresh token
        let mut session = Session::new(
            user.id,
            pair.refresh.id.to_string(),
            "integration-test",
            "198.51.100.4".parse().unwrap(),
            Duration::days(7),
            exchange_at,
        );
        validator
            .validate_session(Some(&session), exchange_at + Duration::minutes(10))
            .unwrap();
        assert!(session.touch(exchange_at + Duration::minutes(25)));
        validator
            .validate_session(Some(&session), exchange_at + Duration::minutes(50))
            .unwrap();
        assert_eq!(
            validator.validate_session(Some(&session), exchange_at + Duration::minutes(56)),
            Err(ValidationError::InactivityTimeout)
        );

        // RBAC on the protected resource
        let resolver = PermissionResolver::new();
        resolver
            .assert_access(Some(&user), ResourceType::Client, Action::Create)
            .unwrap();
        assert!(resolver
            .assert_access(Some(&user), ResourceType::Client, Action::Delete)
            .is_err());

        // logout ends the session and revokes the access token
        let logout_at = exchange_at + Duration::minutes(30);
        assert!(session.logout(&*audit, logout_at));
        assert_eq!(
            validator.validate_session(Some(&session), logout_at),
            Err(ValidationError::InactiveSession)
        );
        let mut access = pair.access.clone();
        assert!(access.revoke_audited(&*audit, logout_at));
        assert_eq!(
            validator.validate_token(Some(&access), logout_at),
            Err(ValidationError::Revoked)
        );

        (pair.access.value, pair.refresh.value)
    });

    let events = audit.0.lock().unwrap();
    let trail: Vec<(AuditEventType, bool)> = events.iter().map(|e| (e.event_type, e.success)).collect();
    assert_eq!(
        trail,
        vec![
            (AuditEventType::RoleChange, true),
            (AuditEventType::Login, false),
            (AuditEventType::Login, true),
            (AuditEventType::TokenIssued, true),
            (AuditEventType::Logout, true),
            (AuditEventType::TokenRevoked, true),
        ]
    );
    let trail_json = serde_json::to_string(&*events).unwrap();
    assert!(!trail_json.contains(PASSWORD));
    assert!(!trail_json.contains(&access_value));

    let logs = logs.contents();
    assert!(logs.contains("PKCE verification failed"));
    assert!(logs.contains("authorization code replayed"));
    for secret in [PASSWORD, verifier, access_value.as_str(), refresh_value.as_str()] {
        assert!(!logs.contains(secret), "secret leaked into logs");
    }
}

#[test]
fn stored_credentials_survive_a_round_trip_through_storage() {
    let hasher = hasher();
    let credentials = Credentials::new("dave@example.com", PASSWORD, &hasher).unwrap();

    let stored = serde_json::to_string(&credentials).unwrap();
    assert!(!stored.contains(PASSWORD));

    let loaded: Credentials = serde_json::from_str(&stored).unwrap();
    assert!(loaded.verify(PASSWORD, &hasher));
    assert!(!loaded.verify("sw0rdfish!2024", &hasher));
}
