//! Ledger behavior shared by every storage backend.
//!
//! Each function runs one scenario against an already migrated store. The
//! backend files call them from their own `#[tokio::test]` wrappers.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Duration, Utc};
use tokio_test::{assert_err, assert_ok};

use librarium_server::{
    config::LedgerConfig,
    models::{
        Book, CreateBook, CreateLoan, CreateUser, LoanFilter, LoanStatus, NewLoan, ReturnLoan,
        UpdateLoan, User,
    },
    repository::Repository,
    services::loans::LoansService,
    AppError,
};

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Unique suffix so scenarios can share a database
fn unique(prefix: &str) -> String {
    let n = SEQUENCE.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, Utc::now().timestamp_micros(), n)
}

pub fn service(store: &Repository) -> LoansService {
    LoansService::new(store.clone(), &LedgerConfig::default())
}

pub async fn seed_book(store: &Repository, copies: i32) -> Book {
    store
        .create_book(&CreateBook {
            title: unique("book"),
            total_copies: copies,
        })
        .await
        .expect("book created")
}

pub async fn seed_user(store: &Repository) -> User {
    store
        .create_user(&CreateUser {
            username: unique("reader"),
            display_name: Some("Test Reader".to_string()),
        })
        .await
        .expect("user created")
}

fn checkout_request(book: &Book, user: &User) -> CreateLoan {
    CreateLoan {
        book_id: book.id,
        user_id: user.id,
        loan_date: None,
        return_date: None,
    }
}

async fn available(store: &Repository, book_id: i64) -> i32 {
    store.get_book(book_id).await.expect("book exists").available_copies
}

/// Two copies, three borrowers: the third waits for the first return
pub async fn checkout_and_return(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 2).await;
    let alice = seed_user(&store).await;
    let bob = seed_user(&store).await;
    let carol = seed_user(&store).await;

    let first = assert_ok!(loans.checkout(checkout_request(&book, &alice)).await);
    assert_eq!(available(&store, book.id).await, 1);
    assert!(first.is_open());
    assert!(first.return_date.is_some());
    assert_eq!(first.status(Utc::now()), LoanStatus::Active);

    let second = assert_ok!(loans.checkout(checkout_request(&book, &bob)).await);
    assert_eq!(available(&store, book.id).await, 0);

    let err = assert_err!(loans.checkout(checkout_request(&book, &carol)).await);
    assert!(matches!(err, AppError::ResourceUnavailable(_)));
    assert_eq!(available(&store, book.id).await, 0);

    let returned = assert_ok!(loans.return_loan(first.id, ReturnLoan::default()).await);
    assert!(returned.actual_return_date.is_some());
    assert_eq!(returned.status(Utc::now()), LoanStatus::Returned);
    assert_eq!(available(&store, book.id).await, 1);

    let third = assert_ok!(loans.checkout(checkout_request(&book, &carol)).await);
    assert_eq!(available(&store, book.id).await, 0);

    assert_ok!(loans.return_loan(second.id, ReturnLoan::default()).await);
    assert_ok!(loans.return_loan(third.id, ReturnLoan::default()).await);
    assert_eq!(available(&store, book.id).await, 2);

    let by_book = LoanFilter {
        book_id: Some(book.id),
        ..LoanFilter::default()
    };
    let history = assert_ok!(loans.find_loans(&by_book).await);
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|view| view.status == LoanStatus::Returned));
}

/// A second return is rejected and leaves the counter alone
pub async fn double_return_is_rejected(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 1).await;
    let user = seed_user(&store).await;

    let loan = assert_ok!(loans.checkout(checkout_request(&book, &user)).await);
    assert_ok!(loans.return_loan(loan.id, ReturnLoan::default()).await);
    assert_eq!(available(&store, book.id).await, 1);

    let err = assert_err!(loans.return_loan(loan.id, ReturnLoan::default()).await);
    assert!(matches!(err, AppError::AlreadyReturned(_)));
    assert_eq!(available(&store, book.id).await, 1);

    let err = assert_err!(loans.return_loan(i64::MAX, ReturnLoan::default()).await);
    assert!(matches!(err, AppError::LoanNotFound(_)));
}

/// Returning before the loan started is invalid and changes nothing
pub async fn return_before_loan_date_is_rejected(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 1).await;
    let user = seed_user(&store).await;

    let loan = assert_ok!(loans.checkout(checkout_request(&book, &user)).await);
    let early = ReturnLoan {
        actual_return_date: Some(loan.loan_date - Duration::days(1)),
    };
    let err = assert_err!(loans.return_loan(loan.id, early).await);
    assert!(matches!(err, AppError::Validation(_)));

    let current = assert_ok!(loans.get_loan(loan.id).await);
    assert!(current.loan.is_open());
    assert_eq!(available(&store, book.id).await, 0);
}

/// Unknown book or borrower: nothing is recorded
pub async fn checkout_of_missing_records(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 1).await;
    let user = seed_user(&store).await;

    let missing_book = CreateLoan {
        book_id: i64::MAX,
        ..checkout_request(&book, &user)
    };
    let err = assert_err!(loans.checkout(missing_book).await);
    assert!(matches!(err, AppError::ResourceNotFound(_)));

    let missing_user = CreateLoan {
        user_id: i64::MAX,
        ..checkout_request(&book, &user)
    };
    let err = assert_err!(loans.checkout(missing_user).await);
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(available(&store, book.id).await, 1);
}

/// A book with no copies at all can never be lent
pub async fn zero_copy_book_is_unavailable(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 0).await;
    let user = seed_user(&store).await;

    let err = assert_err!(loans.checkout(checkout_request(&book, &user)).await);
    assert!(matches!(err, AppError::ResourceUnavailable(_)));
    assert_eq!(available(&store, book.id).await, 0);
}

/// The decrement happens before the insert; a failed insert must undo it
pub async fn failed_insert_rolls_back(store: Repository) {
    let book = seed_book(&store, 3).await;

    // Skips the service's borrower check so the foreign key trips mid-transaction
    let orphan = NewLoan {
        book_id: book.id,
        user_id: i64::MAX,
        loan_date: Utc::now(),
        return_date: None,
    };
    assert_err!(store.checkout(&orphan).await);
    assert_eq!(available(&store, book.id).await, 3);

    let filter = LoanFilter {
        book_id: Some(book.id),
        ..LoanFilter::default()
    };
    assert!(assert_ok!(store.find_by(&filter, Utc::now()).await).is_empty());
}

/// Two borrowers race for the last copy: exactly one wins
pub async fn concurrent_checkouts_of_last_copy(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 1).await;
    let alice = seed_user(&store).await;
    let bob = seed_user(&store).await;

    let first = {
        let loans = loans.clone();
        let request = checkout_request(&book, &alice);
        tokio::spawn(async move { loans.checkout(request).await })
    };
    let second = {
        let loans = loans.clone();
        let request = checkout_request(&book, &bob);
        tokio::spawn(async move { loans.checkout(request).await })
    };

    let results = vec![
        first.await.expect("task completes"),
        second.await.expect("task completes"),
    ];

    let won = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::ResourceUnavailable(_))))
        .count();
    assert_eq!(won, 1, "results: {:?}", results);
    assert_eq!(refused, 1, "results: {:?}", results);
    assert_eq!(available(&store, book.id).await, 0);

    let open = LoanFilter {
        book_id: Some(book.id),
        status: Some(LoanStatus::Active),
        ..LoanFilter::default()
    };
    assert_eq!(assert_ok!(loans.find_loans(&open).await).len(), 1);
}

/// Racing returns of one loan put the copy back exactly once
pub async fn concurrent_returns_of_one_loan(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 2).await;
    let user = seed_user(&store).await;

    let loan = assert_ok!(loans.checkout(checkout_request(&book, &user)).await);
    assert_eq!(available(&store, book.id).await, 1);

    let loan_id = loan.id;
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let loans = loans.clone();
            tokio::spawn(async move { loans.return_loan(loan_id, ReturnLoan::default()).await })
        })
        .collect();

    let mut returned = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(_) => returned += 1,
            Err(AppError::AlreadyReturned(_)) => refused += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(returned, 1);
    assert_eq!(refused, 5);
    assert_eq!(available(&store, book.id).await, 2);
}

/// Many borrowers against a few copies never push the counter below zero
pub async fn concurrent_checkouts_respect_stock(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 3).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let user = seed_user(&store).await;
        let loans = loans.clone();
        let request = checkout_request(&book, &user);
        handles.push(tokio::spawn(async move { loans.checkout(request).await }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(_) => won += 1,
            Err(AppError::ResourceUnavailable(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(won, 3);
    assert_eq!(available(&store, book.id).await, 0);
}

/// Deleting an open loan gives the copy back; deleting a closed one does not
pub async fn delete_restores_only_open_loans(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 2).await;
    let user = seed_user(&store).await;

    let open = assert_ok!(loans.checkout(checkout_request(&book, &user)).await);
    let closed = assert_ok!(loans.checkout(checkout_request(&book, &user)).await);
    assert_ok!(loans.return_loan(closed.id, ReturnLoan::default()).await);
    assert_eq!(available(&store, book.id).await, 1);

    assert_ok!(loans.delete_loan(closed.id).await);
    assert_eq!(available(&store, book.id).await, 1);

    assert_ok!(loans.delete_loan(open.id).await);
    assert_eq!(available(&store, book.id).await, 2);

    let err = assert_err!(loans.get_loan(open.id).await);
    assert!(matches!(err, AppError::LoanNotFound(_)));
    let err = assert_err!(loans.delete_loan(open.id).await);
    assert!(matches!(err, AppError::LoanNotFound(_)));
}

/// Dates of an open loan move; a returned loan is frozen
pub async fn update_changes_dates_of_open_loans(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 1).await;
    let user = seed_user(&store).await;

    let loan = assert_ok!(loans.checkout(checkout_request(&book, &user)).await);
    let extended = loan.loan_date + Duration::days(60);
    let updated = assert_ok!(
        loans
            .update_loan(
                loan.id,
                UpdateLoan {
                    loan_date: None,
                    return_date: Some(extended),
                },
            )
            .await
    );
    assert_eq!(updated.return_date, Some(extended));
    assert_eq!(updated.loan_date, loan.loan_date);
    assert_eq!(available(&store, book.id).await, 0);

    let backwards = UpdateLoan {
        loan_date: None,
        return_date: Some(loan.loan_date - Duration::days(1)),
    };
    let err = assert_err!(loans.update_loan(loan.id, backwards).await);
    assert!(matches!(err, AppError::Validation(_)));

    assert_ok!(loans.return_loan(loan.id, ReturnLoan::default()).await);
    let late = UpdateLoan {
        loan_date: None,
        return_date: Some(extended + Duration::days(1)),
    };
    let err = assert_err!(loans.update_loan(loan.id, late).await);
    assert!(matches!(err, AppError::AlreadyReturned(_)));

    let err = assert_err!(
        loans
            .update_loan(
                i64::MAX,
                UpdateLoan {
                    loan_date: None,
                    return_date: Some(extended),
                },
            )
            .await
    );
    assert!(matches!(err, AppError::LoanNotFound(_)));
}

/// Overdue means open and strictly past due; late returns are just returned
pub async fn overdue_classification(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 3).await;
    let user = seed_user(&store).await;
    let now = Utc::now();

    let late = assert_ok!(
        loans
            .checkout(CreateLoan {
                loan_date: Some(now - Duration::days(10)),
                return_date: Some(now - Duration::days(3)),
                ..checkout_request(&book, &user)
            })
            .await
    );
    let on_time = assert_ok!(
        loans
            .checkout(CreateLoan {
                loan_date: Some(now - Duration::days(1)),
                return_date: Some(now + Duration::days(3)),
                ..checkout_request(&book, &user)
            })
            .await
    );
    let returned_late = assert_ok!(
        loans
            .checkout(CreateLoan {
                loan_date: Some(now - Duration::days(20)),
                return_date: Some(now - Duration::days(10)),
                ..checkout_request(&book, &user)
            })
            .await
    );
    assert_ok!(loans.return_loan(returned_late.id, ReturnLoan::default()).await);

    let overdue: Vec<i64> = assert_ok!(loans.list_overdue().await)
        .into_iter()
        .filter(|details| details.book_id == book.id)
        .map(|details| details.id)
        .collect();
    assert_eq!(overdue, vec![late.id]);

    let view = assert_ok!(loans.get_loan(late.id).await);
    assert_eq!(view.status, LoanStatus::Overdue);
    let view = assert_ok!(loans.get_loan(on_time.id).await);
    assert_eq!(view.status, LoanStatus::Active);
    let view = assert_ok!(loans.get_loan(returned_late.id).await);
    assert_eq!(view.status, LoanStatus::Returned);

    for (status, expected) in [
        (LoanStatus::Overdue, late.id),
        (LoanStatus::Active, on_time.id),
        (LoanStatus::Returned, returned_late.id),
    ] {
        let filter = LoanFilter {
            book_id: Some(book.id),
            status: Some(status),
            ..LoanFilter::default()
        };
        let found: Vec<i64> = assert_ok!(loans.find_loans(&filter).await)
            .into_iter()
            .map(|view| view.loan.id)
            .collect();
        assert_eq!(found, vec![expected], "status {:?}", status);
    }
}

/// The details listing carries book title and borrower name
pub async fn details_join_book_and_user(store: Repository) {
    let loans = service(&store);
    let book = seed_book(&store, 1).await;
    let user = seed_user(&store).await;

    let loan = assert_ok!(loans.checkout(checkout_request(&book, &user)).await);

    let all = assert_ok!(loans.list_all_with_details().await);
    let details = all
        .into_iter()
        .find(|details| details.id == loan.id)
        .expect("loan listed");
    assert_eq!(details.book_title, book.title);
    assert_eq!(details.username, user.username);
    assert_eq!(details.status, LoanStatus::Active);

    let every = assert_ok!(loans.list_loans().await);
    assert!(every.iter().any(|view| view.loan.id == loan.id));

    let mine = assert_ok!(loans.get_user_loans(user.id).await);
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].loan.id, loan.id);

    let err = assert_err!(loans.get_user_loans(i64::MAX).await);
    assert!(matches!(err, AppError::NotFound(_)));
}
