//! End-to-end coverage for the authorizer hook: denying `CREATE TABLE`
//! for names under a prefix and letting everything else through.
#![cfg(feature = "hooks")]

extern crate sqlite_dispatch_core;

use sqlite_dispatch_core::hooks::{AuthAction, AuthContext, Authorization};
use sqlite_dispatch_core::{Connection, Error, ErrorCode};

fn deny_private(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::CreateTable { table_name } if table_name.starts_with("private") => {
            Authorization::Deny
        }
        _ => Authorization::Allow,
    }
}

#[test]
fn denies_tables_under_a_prefix() {
    let db = Connection::open_in_memory().unwrap();
    db.authorizer(Some(deny_private));

    let err = db.execute_batch("CREATE TABLE private_a(x)").unwrap_err();
    match err {
        Error::SqliteFailure(e, _) => assert_eq!(e.code, ErrorCode::AuthorizationForStatementDenied),
        other => panic!("expected AuthorizationForStatementDenied, got {other:?}"),
    }

    db.execute_batch("CREATE TABLE public_a(x)")
        .expect("public_a is not under the denied prefix");

    let err = db.execute_batch("CREATE TABLE privatex(x)").unwrap_err();
    match err {
        Error::SqliteFailure(e, _) => assert_eq!(e.code, ErrorCode::AuthorizationForStatementDenied),
        other => panic!("expected AuthorizationForStatementDenied, got {other:?}"),
    }

    db.authorizer(None::<fn(AuthContext<'_>) -> Authorization>);
    db.execute_batch("CREATE TABLE private_b(x)")
        .expect("authorizer cleared, nothing left to deny");
}
