mod common;

use common::{ADMIN, add_account, approved_user, engine, t0};
use engine::{
    AccountField, AccountStatus, EditableField, EngineError, LogAction, MailboxCredentials,
    NewUser, Registration,
};

#[tokio::test]
async fn admins_are_approved_on_registration() {
    let engine = engine().await;

    let admin = engine.user(ADMIN).await.unwrap();
    assert!(admin.is_approved);

    let registration = engine
        .register_user(
            NewUser {
                telegram_id: 30,
                first_name: Some("Ivan".to_string()),
                ..NewUser::default()
            },
            t0(),
        )
        .await
        .unwrap();
    assert!(matches!(registration, Registration::Created(_)));
    assert!(!registration.user().is_approved);

    let again = engine
        .register_user(
            NewUser {
                telegram_id: 30,
                ..NewUser::default()
            },
            t0(),
        )
        .await
        .unwrap();
    assert!(matches!(again, Registration::Existing(_)));
    assert_eq!(again.user().first_name.as_deref(), Some("Ivan"));

    let pending = engine.pending_users(ADMIN).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].telegram_id, 30);
}

#[tokio::test]
async fn approval_is_admin_only_and_once() {
    let engine = engine().await;
    approved_user(&engine, 30).await;
    engine
        .register_user(
            NewUser {
                telegram_id: 31,
                ..NewUser::default()
            },
            t0(),
        )
        .await
        .unwrap();

    assert_eq!(
        engine.approve_user(30, 31).await,
        Err(EngineError::Forbidden("admin only".to_string()))
    );
    assert_eq!(
        engine.approve_user(ADMIN, 30).await,
        Err(EngineError::Conflict("user 30 is already approved".to_string()))
    );
    assert!(engine.approve_user(ADMIN, 31).await.unwrap().is_approved);
    assert!(engine.require_approved(31).await.is_ok());
}

#[tokio::test]
async fn reject_revokes_access_but_never_for_admins() {
    let engine = engine().await;
    approved_user(&engine, 30).await;

    let rejected = engine.reject_user(ADMIN, 30).await.unwrap();
    assert!(!rejected.is_approved);
    assert_eq!(
        engine.require_approved(30).await,
        Err(EngineError::Forbidden("user not approved".to_string()))
    );
    assert!(matches!(
        engine.reject_user(ADMIN, ADMIN).await,
        Err(EngineError::Forbidden(_))
    ));
}

#[tokio::test]
async fn deleting_a_renter_frees_their_account_first() {
    let engine = engine().await;
    approved_user(&engine, 30).await;
    let account = add_account(&engine, "alpha", 4200, false).await;
    engine.commit_rental(30, account.id, 120, t0()).await.unwrap();

    let released = engine.delete_user(ADMIN, 30, t0()).await.unwrap();
    assert_eq!(released, vec![account.id]);

    let account = engine.account(account.id).await.unwrap();
    assert_eq!(account.status(), AccountStatus::Free);
    assert!(account.rental.is_none());
    assert!(matches!(
        engine.user(30).await,
        Err(EngineError::KeyNotFound(_))
    ));

    let logs = engine.logs_for_account(ADMIN, account.id).await.unwrap();
    assert_eq!(logs.last().unwrap().action, LogAction::ForceReturned);
}

#[tokio::test]
async fn destructive_actions_on_admins_are_denied() {
    let engine = engine().await;

    assert_eq!(
        engine.delete_user(ADMIN, ADMIN, t0()).await,
        Err(EngineError::Forbidden("cannot delete yourself".to_string()))
    );
    approved_user(&engine, 30).await;
    assert_eq!(
        engine.delete_user(30, ADMIN, t0()).await,
        Err(EngineError::Forbidden("admin only".to_string()))
    );
}

#[tokio::test]
async fn broadcast_skips_the_sender() {
    let engine = engine().await;
    approved_user(&engine, 30).await;
    approved_user(&engine, 31).await;

    let mut recipients = engine.broadcast_recipients(ADMIN).await.unwrap();
    recipients.sort_unstable();
    assert_eq!(recipients, vec![30, 31]);
    assert_eq!(engine.all_users(ADMIN).await.unwrap().len(), 3);
}

#[tokio::test]
async fn account_edits_validate_input() {
    let engine = engine().await;
    let account = add_account(&engine, "alpha", 4200, false).await;

    let value = AccountField::parse(EditableField::Mmr, "5100").unwrap();
    let updated = engine
        .update_account_field(ADMIN, account.id, value)
        .await
        .unwrap();
    assert_eq!(updated.mmr, 5100);
    assert_eq!(updated.login, "alpha");

    let value = AccountField::parse(EditableField::Calibration, "yes").unwrap();
    let updated = engine
        .update_account_field(ADMIN, account.id, value)
        .await
        .unwrap();
    assert!(updated.calibration);

    assert!(matches!(
        AccountField::parse(EditableField::Login, "   "),
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine
            .update_account_field(ADMIN, 404, AccountField::Mmr(1))
            .await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn mailbox_can_be_added_edited_and_goes_with_the_account() {
    let engine = engine().await;
    let account = add_account(&engine, "alpha", 4200, false).await;
    assert!(engine.mailbox(account.id).await.unwrap().is_none());
    assert!(matches!(
        engine
            .update_mailbox_login(ADMIN, account.id, "new@mail.example")
            .await,
        Err(EngineError::KeyNotFound(_))
    ));

    engine
        .set_mailbox(
            ADMIN,
            account.id,
            MailboxCredentials {
                login: "box@mail.example".to_string(),
                password: "first".to_string(),
            },
        )
        .await
        .unwrap();
    let mailbox = engine
        .update_mailbox_password(ADMIN, account.id, "second")
        .await
        .unwrap();
    let credentials = mailbox.credentials().unwrap();
    assert_eq!(credentials.login, "box@mail.example");
    assert_eq!(credentials.password, "second");

    engine.delete_account(ADMIN, account.id).await.unwrap();
    assert!(engine.mailbox(account.id).await.unwrap().is_none());
    assert!(matches!(
        engine.account(account.id).await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn rented_account_can_still_be_deleted() {
    let engine = engine().await;
    approved_user(&engine, 30).await;
    let account = add_account(&engine, "alpha", 4200, true).await;
    engine.commit_rental(30, account.id, 60, t0()).await.unwrap();

    let deleted = engine.delete_account(ADMIN, account.id).await.unwrap();
    assert!(deleted.is_rented_by(30));
    assert!(engine.active_rental(30).await.unwrap().is_none());
}
