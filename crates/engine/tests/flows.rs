mod common;

use std::time::Duration;

use common::{ADMIN, ScriptedFetcher, add_account, approved_user, engine, engine_with, t0};
use engine::{
    AccountStatus, EngineError, FieldChoice, LogAction, RentalPolicy, RentalReply, RentalState,
    ReturnField, ReturnReply, ReturnState, WaitPolicy, cancel_pair,
};

fn quick_policy() -> RentalPolicy {
    RentalPolicy {
        wait: WaitPolicy {
            attempts: 30,
            interval: Duration::from_millis(1),
            ..WaitPolicy::default()
        },
        ..RentalPolicy::default()
    }
}

#[tokio::test]
async fn rental_without_mailbox_finishes_on_duration() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, false).await;

    let (mut ctx, reply) = engine.start_rental(10).await.unwrap();
    let RentalReply::ChooseAccount { accounts } = reply else {
        panic!("unexpected reply {reply:?}");
    };
    assert_eq!(accounts, vec![account.clone()]);

    let reply = engine.select_rental_account(&mut ctx, account.id).await.unwrap();
    assert_eq!(
        reply,
        RentalReply::ChooseDuration {
            account_id: account.id,
            durations: vec![60, 120, 180, 360, 720, 1440],
        }
    );
    assert!(engine.account(account.id).await.unwrap().is_free());

    let reply = engine
        .select_rental_duration(&mut ctx, 180, t0())
        .await
        .unwrap();
    let RentalReply::Rented { account: rented, code: None } = reply else {
        panic!("unexpected reply {reply:?}");
    };
    assert!(rented.is_rented_by(10));
    assert!(ctx.is_finished());

    let logs = engine.logs_for_account(ADMIN, account.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, LogAction::RentedWithoutCode);
}

#[tokio::test]
async fn bad_duration_keeps_the_step() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, false).await;

    let (mut ctx, _) = engine.start_rental(10).await.unwrap();
    engine.select_rental_account(&mut ctx, account.id).await.unwrap();

    let err = engine
        .select_rental_duration(&mut ctx, 90, t0())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(ctx.state(), RentalState::SelectDuration);
    assert!(engine.account(account.id).await.unwrap().is_free());
}

#[tokio::test]
async fn losing_the_race_at_duration_aborts_without_writes() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    approved_user(&engine, 11).await;
    let account = add_account(&engine, "alpha", 4200, false).await;

    let (mut slow, _) = engine.start_rental(10).await.unwrap();
    engine.select_rental_account(&mut slow, account.id).await.unwrap();
    let (mut fast, _) = engine.start_rental(11).await.unwrap();
    engine.select_rental_account(&mut fast, account.id).await.unwrap();
    engine
        .select_rental_duration(&mut fast, 60, t0())
        .await
        .unwrap();

    let reply = engine
        .select_rental_duration(&mut slow, 60, t0())
        .await
        .unwrap();
    assert!(matches!(reply, RentalReply::Aborted { .. }));
    assert!(slow.is_finished());
    assert!(engine.account(account.id).await.unwrap().is_rented_by(11));
    assert!(engine.active_rental(10).await.unwrap().is_none());
}

#[tokio::test]
async fn cancelling_before_commit_writes_nothing() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, false).await;

    let (mut ctx, _) = engine.start_rental(10).await.unwrap();
    engine.select_rental_account(&mut ctx, account.id).await.unwrap();
    assert_eq!(engine.cancel_rental(&mut ctx).unwrap(), RentalReply::Cancelled);

    assert!(engine.account(account.id).await.unwrap().is_free());
    assert!(engine.logs_for_account(ADMIN, account.id).await.unwrap().is_empty());
    assert!(matches!(
        engine.cancel_rental(&mut ctx),
        Err(EngineError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn renter_with_active_rental_cannot_start_another() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, false).await;
    engine.commit_rental(10, account.id, 60, t0()).await.unwrap();

    assert_eq!(
        engine.start_rental(10).await.map(|(_, reply)| reply),
        Err(EngineError::Conflict(
            "user already has an active rental".to_string()
        ))
    );
}

#[tokio::test]
async fn empty_inventory_ends_the_conversation() {
    let engine = engine().await;
    approved_user(&engine, 10).await;

    let (ctx, reply) = engine.start_rental(10).await.unwrap();
    assert_eq!(reply, RentalReply::NoFreeAccounts);
    assert!(ctx.is_finished());
}

#[tokio::test]
async fn code_found_on_third_attempt() {
    let fetcher = ScriptedFetcher::code_on(3);
    let engine = engine_with(fetcher.clone(), quick_policy()).await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, true).await;

    let (mut ctx, _) = engine.start_rental(10).await.unwrap();
    engine.select_rental_account(&mut ctx, account.id).await.unwrap();
    let reply = engine
        .select_rental_duration(&mut ctx, 60, t0())
        .await
        .unwrap();
    assert!(matches!(reply, RentalReply::ConfirmCode { .. }));
    assert!(ctx.requires_code());
    assert!(engine.logs_for_account(ADMIN, account.id).await.unwrap().is_empty());

    let reply = engine
        .confirm_code_required(&mut ctx, true, t0())
        .await
        .unwrap();
    assert!(matches!(reply, RentalReply::WaitingForCode { attempts: 30, .. }));

    let (_handle, mut signal) = cancel_pair();
    let mut progress = Vec::new();
    let reply = engine
        .await_rental_code(&mut ctx, &mut signal, |attempt, _| progress.push(attempt))
        .await
        .unwrap();

    let RentalReply::Rented { code, .. } = reply else {
        panic!("unexpected reply {reply:?}");
    };
    assert_eq!(code.as_deref(), Some("F7K2Q"));
    assert_eq!(progress, vec![1, 2, 3]);
    assert_eq!(fetcher.calls(), 3);
    let logs = engine.logs_for_account(ADMIN, account.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, LogAction::RentedWithCode);
}

#[tokio::test]
async fn no_code_after_thirty_attempts_keeps_the_account_rented() {
    let fetcher = ScriptedFetcher::never();
    let engine = engine_with(fetcher.clone(), quick_policy()).await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, true).await;

    let (mut ctx, _) = engine.start_rental(10).await.unwrap();
    engine.select_rental_account(&mut ctx, account.id).await.unwrap();
    engine
        .select_rental_duration(&mut ctx, 60, t0())
        .await
        .unwrap();
    engine
        .confirm_code_required(&mut ctx, true, t0())
        .await
        .unwrap();

    let (_handle, mut signal) = cancel_pair();
    let reply = engine
        .await_rental_code(&mut ctx, &mut signal, |_, _| {})
        .await
        .unwrap();

    let RentalReply::CodeNotObtained { account: after } = reply else {
        panic!("unexpected reply {reply:?}");
    };
    assert_eq!(fetcher.calls(), 30);
    assert_eq!(after.status(), AccountStatus::Rented);
    assert!(after.is_rented_by(10));
    assert!(ctx.is_finished());

    let logs = engine.logs_for_account(ADMIN, account.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, LogAction::CodeNotObtained);
}

#[tokio::test]
async fn cancelled_code_wait_leaves_the_rental_in_place() {
    let fetcher = ScriptedFetcher::never();
    let engine = engine_with(fetcher.clone(), quick_policy()).await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, true).await;

    let (mut ctx, _) = engine.start_rental(10).await.unwrap();
    engine.select_rental_account(&mut ctx, account.id).await.unwrap();
    engine
        .select_rental_duration(&mut ctx, 60, t0())
        .await
        .unwrap();
    engine
        .confirm_code_required(&mut ctx, true, t0())
        .await
        .unwrap();

    let (handle, mut signal) = cancel_pair();
    let reply = engine
        .await_rental_code(&mut ctx, &mut signal, |attempt, _| {
            if attempt == 5 {
                handle.cancel();
            }
        })
        .await
        .unwrap();

    assert_eq!(reply, RentalReply::Cancelled);
    assert!(fetcher.calls() < 30);
    assert!(engine.account(account.id).await.unwrap().is_rented_by(10));
    assert!(engine.logs_for_account(ADMIN, account.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn declining_the_code_logs_a_plain_rental() {
    let engine = engine_with(ScriptedFetcher::never(), quick_policy()).await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, true).await;

    let (mut ctx, _) = engine.start_rental(10).await.unwrap();
    engine.select_rental_account(&mut ctx, account.id).await.unwrap();
    engine
        .select_rental_duration(&mut ctx, 60, t0())
        .await
        .unwrap();
    let reply = engine
        .confirm_code_required(&mut ctx, false, t0())
        .await
        .unwrap();

    assert!(matches!(reply, RentalReply::Rented { code: None, .. }));
    let logs = engine.logs_for_account(ADMIN, account.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, LogAction::RentedWithoutCode);
}

#[tokio::test]
async fn return_flow_reprompts_on_bad_numbers() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, false).await;
    engine.commit_rental(10, account.id, 60, t0()).await.unwrap();

    let (mut ctx, reply) = engine.start_return(10).await.unwrap();
    assert!(matches!(reply, ReturnReply::AskUpdate { .. }));
    assert_eq!(
        engine.answer_update(&mut ctx, true, t0()).await.unwrap(),
        ReturnReply::ChooseFields
    );
    assert_eq!(
        engine.choose_fields(&mut ctx, FieldChoice::Both).unwrap(),
        ReturnReply::AskValue(ReturnField::Mmr)
    );

    let err = engine
        .submit_value(&mut ctx, "a lot", t0())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidInput("mmr must be a number".to_string()));
    assert_eq!(ctx.state(), ReturnState::InputValue(ReturnField::Mmr));

    assert_eq!(
        engine.submit_value(&mut ctx, "4400", t0()).await.unwrap(),
        ReturnReply::AskValue(ReturnField::Behavior)
    );
    let reply = engine.submit_value(&mut ctx, "9500", t0()).await.unwrap();
    let ReturnReply::Returned { account: returned } = reply else {
        panic!("unexpected reply {reply:?}");
    };
    assert_eq!(returned.mmr, 4400);
    assert_eq!(returned.behavior, Some(9500));
    assert!(returned.is_free());
    assert!(ctx.is_finished());

    let logs = engine.logs_for_account(ADMIN, account.id).await.unwrap();
    assert_eq!(logs.last().unwrap().action, LogAction::Returned);
}

#[tokio::test]
async fn return_declined_releases_unchanged() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, false).await;
    engine.commit_rental(10, account.id, 60, t0()).await.unwrap();

    let (mut ctx, _) = engine.start_return(10).await.unwrap();
    let reply = engine.answer_update(&mut ctx, false, t0()).await.unwrap();
    assert_eq!(reply, ReturnReply::Returned { account });
}

#[tokio::test]
async fn return_after_expiry_reports_conflict() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, false).await;
    engine.commit_rental(10, account.id, 60, t0()).await.unwrap();

    let (mut ctx, _) = engine.start_return(10).await.unwrap();
    engine
        .sweep_expired(t0() + chrono::Duration::minutes(60))
        .await
        .unwrap();

    let reply = engine.answer_update(&mut ctx, false, t0()).await.unwrap();
    assert_eq!(
        reply,
        ReturnReply::Aborted {
            reason: "no active rental".to_string()
        }
    );
    assert!(ctx.is_finished());
    let cancelled = engine.cancel_return(&mut ctx);
    assert!(cancelled.is_err());
}

#[tokio::test]
async fn return_flow_never_releases_a_later_rental() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let first = add_account(&engine, "alpha", 4200, false).await;
    let second = add_account(&engine, "beta", 3900, false).await;
    engine.commit_rental(10, first.id, 60, t0()).await.unwrap();

    let (mut ctx, _) = engine.start_return(10).await.unwrap();
    let later = t0() + chrono::Duration::minutes(61);
    engine.sweep_expired(later).await.unwrap();
    engine.commit_rental(10, second.id, 60, later).await.unwrap();

    let reply = engine.answer_update(&mut ctx, false, later).await.unwrap();
    assert!(matches!(reply, ReturnReply::Aborted { .. }));
    assert!(ctx.is_finished());

    let second = engine.account(second.id).await.unwrap();
    assert!(second.is_rented_by(10));
    assert_eq!(second.mmr, 3900);
    assert!(engine.account(first.id).await.unwrap().is_free());
}

#[tokio::test]
async fn staged_edits_skip_a_new_rental_of_the_same_account() {
    let engine = engine().await;
    approved_user(&engine, 10).await;
    let account = add_account(&engine, "alpha", 4200, false).await;
    engine.commit_rental(10, account.id, 60, t0()).await.unwrap();

    let (mut ctx, _) = engine.start_return(10).await.unwrap();
    engine.answer_update(&mut ctx, true, t0()).await.unwrap();
    engine.choose_fields(&mut ctx, FieldChoice::Mmr).unwrap();

    let later = t0() + chrono::Duration::minutes(61);
    engine.sweep_expired(later).await.unwrap();
    engine.commit_rental(10, account.id, 120, later).await.unwrap();

    let reply = engine.submit_value(&mut ctx, "100", later).await.unwrap();
    assert_eq!(
        reply,
        ReturnReply::Aborted {
            reason: "rental already ended".to_string()
        }
    );
    let account = engine.account(account.id).await.unwrap();
    assert_eq!(account.mmr, 4200);
    let rental = account.rental.unwrap();
    assert_eq!(rental.rented_at, later);
    assert_eq!(rental.duration_minutes, 120);
}
