//! Access guard: role and ownership based permission checks
//!
//! Every role grants a set of actions, each with a scope. `Any` applies to
//! every resource, `Own` only to resources owned by the calling principal.
//! Lookups are pure and deterministic; nothing here touches storage.

use std::collections::HashMap;
use std::str::FromStr;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        person::Person,
        principal::{Principal, Role},
    },
};

/// Operations subject to access control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ListBooks,
    ReadBook,
    CreateBook,
    UpdateBook,
    DeleteBook,
    ListDeletedBooks,
    AssignBook,
    FreeBook,
    ViewCover,
    ViewContent,
    ReleaseView,
    ListPeople,
    ReadPerson,
    CreatePerson,
    UpdatePerson,
    DeletePerson,
    ListDeletedPeople,
    ListPersonBooks,
}

impl Action {
    pub const ALL: [Action; 18] = [
        Action::ListBooks,
        Action::ReadBook,
        Action::CreateBook,
        Action::UpdateBook,
        Action::DeleteBook,
        Action::ListDeletedBooks,
        Action::AssignBook,
        Action::FreeBook,
        Action::ViewCover,
        Action::ViewContent,
        Action::ReleaseView,
        Action::ListPeople,
        Action::ReadPerson,
        Action::CreatePerson,
        Action::UpdatePerson,
        Action::DeletePerson,
        Action::ListDeletedPeople,
        Action::ListPersonBooks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ListBooks => "book:list",
            Action::ReadBook => "book:read",
            Action::CreateBook => "book:create",
            Action::UpdateBook => "book:update",
            Action::DeleteBook => "book:delete",
            Action::ListDeletedBooks => "book:list_deleted",
            Action::AssignBook => "book:assign",
            Action::FreeBook => "book:free",
            Action::ViewCover => "book:view_cover",
            Action::ViewContent => "book:view_content",
            Action::ReleaseView => "book:release",
            Action::ListPeople => "person:list",
            Action::ReadPerson => "person:read",
            Action::CreatePerson => "person:create",
            Action::UpdatePerson => "person:update",
            Action::DeletePerson => "person:delete",
            Action::ListDeletedPeople => "person:list_deleted",
            Action::ListPersonBooks => "person:books",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .find(|action| action.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown action: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Book,
    Person,
    /// A prospective loan; its owner is the borrower
    Loan,
}

/// Protected entity as seen by the guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    /// None for collection-level actions
    pub id: Option<i64>,
    pub owner: Option<i64>,
}

impl Resource {
    pub fn books() -> Self {
        Self {
            kind: ResourceKind::Book,
            id: None,
            owner: None,
        }
    }

    pub fn people() -> Self {
        Self {
            kind: ResourceKind::Person,
            id: None,
            owner: None,
        }
    }

    pub fn book(book: &Book) -> Self {
        Self {
            kind: ResourceKind::Book,
            id: Some(book.id),
            owner: book.holder_id,
        }
    }

    /// A person owns their own record
    pub fn person(person_id: i64) -> Self {
        Self {
            kind: ResourceKind::Person,
            id: Some(person_id),
            owner: Some(person_id),
        }
    }

    pub fn loan(book_id: i64, borrower_id: i64) -> Self {
        Self {
            kind: ResourceKind::Loan,
            id: Some(book_id),
            owner: Some(borrower_id),
        }
    }
}

impl From<&Book> for Resource {
    fn from(book: &Book) -> Self {
        Resource::book(book)
    }
}

impl From<&Person> for Resource {
    fn from(person: &Person) -> Self {
        Resource::person(person.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Any,
    Own,
}

#[derive(Debug, Clone)]
pub struct AccessGuard {
    grants: HashMap<Role, HashMap<Action, Scope>>,
}

impl AccessGuard {
    /// Guard with an explicit permission table
    pub fn new(grants: HashMap<Role, HashMap<Action, Scope>>) -> Self {
        Self { grants }
    }

    /// Look up a named action. Unknown names are denied.
    pub fn authorize(&self, principal: &Principal, action: &str, resource: &Resource) -> bool {
        match action.parse::<Action>() {
            Ok(action) => self.allows(principal, action, resource),
            Err(e) => {
                tracing::debug!("{}", e);
                false
            }
        }
    }

    pub fn allows(&self, principal: &Principal, action: Action, resource: &Resource) -> bool {
        principal.roles.iter().any(|role| {
            match self.grants.get(role).and_then(|actions| actions.get(&action)) {
                Some(Scope::Any) => true,
                Some(Scope::Own) => resource.owner == Some(principal.person_id()),
                None => false,
            }
        })
    }

    pub fn require(&self, principal: &Principal, action: Action, resource: &Resource) -> AppResult<()> {
        if self.allows(principal, action, resource) {
            Ok(())
        } else {
            tracing::info!(
                "Denied {} on {:?} {:?} for person {}",
                action,
                resource.kind,
                resource.id,
                principal.person_id()
            );
            Err(AppError::Authorization(format!("Not allowed to perform {}", action)))
        }
    }
}

impl Default for AccessGuard {
    fn default() -> Self {
        use Action::*;

        let user: HashMap<Action, Scope> = [
            (ListBooks, Scope::Any),
            (ReadBook, Scope::Any),
            (ViewCover, Scope::Any),
            (ViewContent, Scope::Any),
            (ReleaseView, Scope::Own),
            (AssignBook, Scope::Own),
            (FreeBook, Scope::Own),
            (ReadPerson, Scope::Own),
            (UpdatePerson, Scope::Own),
            (ListPersonBooks, Scope::Own),
        ]
        .into_iter()
        .collect();

        let admin: HashMap<Action, Scope> = Action::ALL.iter().map(|a| (*a, Scope::Any)).collect();

        Self::new([(Role::User, user), (Role::Admin, admin)].into_iter().collect())
    }
}
