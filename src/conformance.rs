//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

//! Behaviour every backend must share, run against each `MapperProvider`.
//!
//! Each check takes the provider alone and branches on its capabilities, so
//! a backend lacking a feature is verified to reject it at factory time.

use std::sync::Mutex;

use chrono::prelude::*;
use rayon::prelude::*;

use crate::memory::MemoryMapperProvider;
use crate::model::*;
use crate::sqlite::SqliteMapperProvider;
use crate::store::*;
use crate::support::error::Error;
use crate::support::store_config::StoreConfig;

struct Fixture {
    provider: Box<dyn MapperProvider>,
    _tmpdir: Option<tempfile::TempDir>,
}

impl Fixture {
    fn config() -> StoreConfig {
        // A tiny batch size so that iteration always crosses batches.
        StoreConfig {
            fetch_batch_size: 2,
            lock_timeout_ms: 30_000,
            ..StoreConfig::default()
        }
    }

    fn memory() -> Self {
        crate::init_test_log();
        Self {
            provider: Box::new(MemoryMapperProvider::new(Self::config())),
            _tmpdir: None,
        }
    }

    fn sqlite() -> Self {
        crate::init_test_log();
        let tmpdir = tempfile::TempDir::new().unwrap();
        let provider = SqliteMapperProvider::open(
            &tmpdir.path().join("store.sqlite"),
            Self::config(),
        )
        .unwrap();
        Self {
            provider: Box::new(provider),
            _tmpdir: Some(tmpdir),
        }
    }
}

macro_rules! conformance_tests {
    ($($name:ident),* $(,)?) => {
        mod memory_backend {
            $(
                #[test]
                fn $name() {
                    let fixture = super::Fixture::memory();
                    super::$name(&*fixture.provider);
                }
            )*
        }

        mod sqlite_backend {
            $(
                #[test]
                fn $name() {
                    let fixture = super::Fixture::sqlite();
                    super::$name(&*fixture.provider);
                }
            )*
        }
    };
}

conformance_tests!(
    uids_are_unique_under_concurrency,
    concurrent_modseqs_are_contiguous,
    last_uid_follows_appends,
    append_round_trip,
    deleting_deleted_mailbox_fails,
    failed_unit_rolls_back_uid_and_message,
    expunged_uids_are_never_reissued,
    unsupported_capabilities_fail_at_factory,
    iteration_pages_across_batches,
    update_flags_uses_one_modseq,
    expunge_marked_for_deletion,
    copy_and_move,
    rename_modes,
    mailbox_queries,
    annotations,
    message_id_mapper,
    message_id_copies_within_one_mailbox,
    keywords_must_be_atoms,
    attachments,
    clear_removes_everything_but_counters,
    generated_message_ids_increase,
);

fn path(name: &str) -> MailboxPath {
    MailboxPath::for_user("alice", name).unwrap()
}

fn create(provider: &dyn MapperProvider, name: &str) -> Mailbox {
    provider
        .create_mailbox_mapper()
        .unwrap()
        .create(&path(name))
        .unwrap()
}

fn message(body: &str) -> NewMessage {
    NewMessage::new(
        body.as_bytes().to_vec(),
        Utc.timestamp_millis_opt(1_600_000_000_000).unwrap(),
    )
}

fn uids(iter: MessageIter<'_>) -> Vec<Uid> {
    iter.map(|m| m.unwrap().uid).collect()
}

fn all_uids(messages: &dyn MessageMapper, mailbox: &Mailbox) -> Vec<Uid> {
    uids(
        messages
            .find_in_mailbox(
                mailbox,
                MessageRange::All,
                FetchGroup::Metadata,
                None,
            )
            .unwrap(),
    )
}

fn fetch(
    messages: &dyn MessageMapper,
    mailbox: &Mailbox,
    uid: Uid,
) -> Message {
    messages
        .find_in_mailbox(
            mailbox,
            MessageRange::One(uid),
            FetchGroup::Full,
            None,
        )
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
}

fn assert_strictly_increasing<T: PartialOrd + std::fmt::Debug>(values: &[T]) {
    assert!(
        values.windows(2).all(|w| w[0] < w[1]),
        "Not strictly increasing: {:?}",
        values
    );
}

fn uids_are_unique_under_concurrency(provider: &dyn MapperProvider) {
    let mailbox = create(provider, "INBOX");

    let seen = Mutex::new(Vec::new());
    (0..4).into_par_iter().for_each(|_| {
        let uid_provider = provider.uid_provider().unwrap();
        let mine = (0..25)
            .map(|_| u32::from(uid_provider.next_uid(&mailbox).unwrap()))
            .collect::<Vec<_>>();
        assert_strictly_increasing(&mine);
        seen.lock().unwrap().extend(mine);
    });

    let mut seen = seen.into_inner().unwrap();
    seen.sort_unstable();
    assert_eq!((1..=100).collect::<Vec<u32>>(), seen);
    assert_eq!(
        Some(Uid::u(100)),
        provider.uid_provider().unwrap().last_uid(&mailbox).unwrap()
    );
}

fn concurrent_modseqs_are_contiguous(provider: &dyn MapperProvider) {
    let mailbox = create(provider, "INBOX");
    let start = provider
        .modseq_provider()
        .unwrap()
        .highest_modseq(&mailbox)
        .unwrap()
        .raw();

    let caller = || {
        let modseqs = provider.modseq_provider().unwrap();
        (0..100)
            .map(|_| modseqs.next_modseq(&mailbox).unwrap().raw())
            .collect::<Vec<u64>>()
    };
    let (a, b) = rayon::join(caller, caller);
    assert_strictly_increasing(&a);
    assert_strictly_increasing(&b);

    let mut union = a;
    union.extend(b);
    union.sort_unstable();
    assert_eq!((start + 1..=start + 200).collect::<Vec<u64>>(), union);
}

fn last_uid_follows_appends(provider: &dyn MapperProvider) {
    let mailboxes = provider.create_mailbox_mapper().unwrap();
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");
    assert_eq!(None, messages.last_uid(&mailbox).unwrap());

    let mut last = None;
    for i in 0..5 {
        let appended =
            messages.append(&mailbox, message(&format!("m{i}"))).unwrap();
        assert_eq!(Some(appended.uid), messages.last_uid(&mailbox).unwrap());
        last = Some(appended.uid);
    }

    assert_eq!(Some(Uid::u(5)), last);
    assert_eq!(
        last,
        provider.uid_provider().unwrap().last_uid(&mailbox).unwrap()
    );
    assert_eq!(last, mailboxes.find_by_id(mailbox.id).unwrap().last_uid);
    assert_eq!(5, messages.count_messages(&mailbox).unwrap());
}

fn append_round_trip(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");

    let flags = vec![
        Flag::Seen,
        Flag::Flagged,
        Flag::Keyword("$Label1".to_owned()),
    ]
    .into_iter()
    .collect::<Flags>();
    let date = Utc.timestamp_millis_opt(1_600_000_000_123).unwrap();
    let appended = messages
        .append(
            &mailbox,
            NewMessage::new(b"Subject: hi\r\n\r\nbody".to_vec(), date)
                .with_flags(flags.clone()),
        )
        .unwrap();
    assert_eq!(Uid::MIN, appended.uid);
    assert_eq!(flags, appended.flags);
    assert_eq!(19, appended.size);

    let found = fetch(&*messages, &mailbox, appended.uid);
    assert_eq!(mailbox.id, found.mailbox_id);
    assert_eq!(appended.message_id, found.message_id);
    assert_eq!(appended.modseq, found.modseq);
    assert_eq!(flags, found.flags);
    assert_eq!(19, found.size);
    assert_eq!(date, found.internal_date);
    assert_eq!(Some(b"Subject: hi\r\n\r\nbody".to_vec()), found.content);
    assert_eq!(appended, found.metadata());

    let metadata_only = messages
        .find_in_mailbox(
            &mailbox,
            MessageRange::All,
            FetchGroup::Metadata,
            None,
        )
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(None, metadata_only.content);
    assert_eq!(19, metadata_only.size);
}

fn keywords_must_be_atoms(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");

    let spaced = Flags::new().with(Flag::Keyword("two words".to_owned()));
    assert_matches!(
        Err(Error::BadFlag(_)),
        messages.append(&mailbox, message("a").with_flags(spaced.clone())),
    );
    assert_eq!(None, messages.last_uid(&mailbox).unwrap());
    assert_eq!(Modseq::MIN, messages.highest_modseq(&mailbox).unwrap());

    let several = vec![
        Flag::Keyword("two".to_owned()),
        Flag::Keyword("words".to_owned()),
        Flag::Keyword("$Junk".to_owned()),
    ]
    .into_iter()
    .collect::<Flags>();
    let appended = messages
        .append(&mailbox, message("b").with_flags(several.clone()))
        .unwrap();
    assert_eq!(several, fetch(&*messages, &mailbox, appended.uid).flags);

    assert_matches!(
        Err(Error::BadFlag(_)),
        messages.update_flags(
            &mailbox,
            MessageRange::All,
            &FlagsUpdate::replace(spaced),
        ),
    );
    assert_eq!(several, fetch(&*messages, &mailbox, appended.uid).flags);
    assert_eq!(appended.modseq, messages.highest_modseq(&mailbox).unwrap());
}

fn deleting_deleted_mailbox_fails(provider: &dyn MapperProvider) {
    let mailboxes = provider.create_mailbox_mapper().unwrap();
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");
    messages.append(&mailbox, message("doomed")).unwrap();

    mailboxes.delete(&mailbox).unwrap();
    assert_matches!(Err(Error::NxMailbox(_)), mailboxes.delete(&mailbox));
    assert_matches!(Err(Error::NxMailbox(_)), mailboxes.find_by_id(mailbox.id));
    assert_matches!(
        Err(Error::NxMailbox(_)),
        mailboxes.find_by_path(&mailbox.path),
    );
    assert_matches!(
        Err(Error::NxMailbox(_)),
        messages.count_messages(&mailbox),
    );

    // The path is free again, under a new identity.
    let again = create(provider, "INBOX");
    assert_ne!(mailbox.id, again.id);
    assert_eq!(0, messages.count_messages(&again).unwrap());
}

fn failed_unit_rolls_back_uid_and_message(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");
    messages.append(&mailbox, message("kept")).unwrap();
    let modseq = messages.highest_modseq(&mailbox).unwrap();

    let result = in_unit_of_work(&*messages, "append", || {
        messages.append(&mailbox, message("doomed"))?;
        Err::<(), _>(Error::MailboxFull)
    });
    assert_matches!(Err(Error::MailboxFull), result);

    assert_eq!(Some(Uid::u(1)), messages.last_uid(&mailbox).unwrap());
    assert_eq!(modseq, messages.highest_modseq(&mailbox).unwrap());
    assert_eq!(vec![Uid::u(1)], all_uids(&*messages, &mailbox));

    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        in_unit_of_work(&*messages, "append", || -> Result<(), Error> {
            messages.append(&mailbox, message("doomed"))?;
            panic!("injected")
        })
    }));
    assert!(panicked.is_err());
    assert_eq!(Some(Uid::u(1)), messages.last_uid(&mailbox).unwrap());
    assert_eq!(1, messages.count_messages(&mailbox).unwrap());

    // The store is usable afterwards.
    assert_eq!(
        Uid::u(2),
        messages.append(&mailbox, message("next")).unwrap().uid
    );
}

fn expunged_uids_are_never_reissued(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");

    for (i, body) in ["one", "two", "three"].into_iter().enumerate() {
        assert_eq!(
            Uid::u(i as u32 + 1),
            messages.append(&mailbox, message(body)).unwrap().uid
        );
    }

    let before = messages.highest_modseq(&mailbox).unwrap();
    let expunged = messages.expunge(&mailbox, &UidSet::just(Uid::u(2))).unwrap();
    assert_eq!(
        vec![Uid::u(2)],
        expunged.iter().map(|m| m.uid).collect::<Vec<_>>()
    );
    assert!(messages.highest_modseq(&mailbox).unwrap() > before);
    assert_eq!(Some(Uid::u(3)), messages.last_uid(&mailbox).unwrap());

    // Already gone, so nothing happens.
    assert!(messages
        .expunge(&mailbox, &UidSet::just(Uid::u(2)))
        .unwrap()
        .is_empty());

    assert_eq!(
        Uid::u(4),
        messages.append(&mailbox, message("four")).unwrap().uid
    );
    assert_eq!(
        vec![Uid::u(1), Uid::u(3), Uid::u(4)],
        all_uids(&*messages, &mailbox)
    );
}

fn check_factory(
    capabilities: Capabilities,
    capability: Capabilities,
    result: Result<(), Error>,
) {
    if capabilities.contains(capability) {
        result.unwrap();
    } else {
        assert_matches!(Err(Error::Unsupported { .. }), result);
    }
}

fn unsupported_capabilities_fail_at_factory(provider: &dyn MapperProvider) {
    let capabilities = provider.supported_capabilities();
    assert!(capabilities.contains(Capabilities::MAILBOX | Capabilities::MESSAGE));
    assert_eq!(
        capabilities.contains(Capabilities::PARTIAL_ATTACHMENT_FETCH),
        provider.supports_partial_attachment_fetch()
    );

    check_factory(
        capabilities,
        Capabilities::MAILBOX,
        provider.create_mailbox_mapper().map(|_| ()),
    );
    check_factory(
        capabilities,
        Capabilities::MESSAGE,
        provider.create_message_mapper().map(|_| ()),
    );
    check_factory(
        capabilities,
        Capabilities::UNIQUE_MESSAGE_ID,
        provider.create_message_id_mapper().map(|_| ()),
    );
    check_factory(
        capabilities,
        Capabilities::ANNOTATION,
        provider.create_annotation_mapper().map(|_| ()),
    );
    check_factory(
        capabilities,
        Capabilities::ATTACHMENT,
        provider.create_attachment_mapper().map(|_| ()),
    );
}

fn iteration_pages_across_batches(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");
    for i in 0..7 {
        messages.append(&mailbox, message(&format!("m{i}"))).unwrap();
    }

    let find = |range: MessageRange, limit: Option<usize>| {
        uids(
            messages
                .find_in_mailbox(&mailbox, range, FetchGroup::Metadata, limit)
                .unwrap(),
        )
    };

    assert_eq!(
        (1..=7).map(Uid::u).collect::<Vec<_>>(),
        find(MessageRange::All, None)
    );
    assert_eq!(
        vec![Uid::u(3), Uid::u(4), Uid::u(5)],
        find(MessageRange::From(Uid::u(3)), Some(3))
    );
    assert_eq!(
        vec![Uid::u(6), Uid::u(7)],
        find(MessageRange::After(Uid::u(5)), None)
    );
    assert_eq!(
        vec![Uid::u(2), Uid::u(3), Uid::u(4), Uid::u(5)],
        find(MessageRange::Range(Uid::u(2), Uid::u(5)), None)
    );
    assert!(find(MessageRange::After(Uid::u(7)), None).is_empty());
    assert!(find(MessageRange::Range(Uid::u(5), Uid::u(2)), None).is_empty());
    assert!(find(MessageRange::All, Some(0)).is_empty());

    let other = create(provider, "Empty");
    assert!(all_uids(&*messages, &other).is_empty());
}

fn update_flags_uses_one_modseq(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");
    for body in ["a", "b", "c"] {
        messages.append(&mailbox, message(body)).unwrap();
    }
    assert_eq!(3, messages.count_unseen(&mailbox).unwrap());
    assert_eq!(
        Some(Uid::u(1)),
        messages.find_first_unseen_uid(&mailbox).unwrap()
    );

    let before = messages.highest_modseq(&mailbox).unwrap();
    let seen = FlagsUpdate::add(Flags::new().with(Flag::Seen));
    let updated = messages
        .update_flags(&mailbox, MessageRange::Range(Uid::u(1), Uid::u(2)), &seen)
        .unwrap();
    assert_eq!(2, updated.len());
    let modseq = updated[0].modseq;
    assert_eq!(Some(modseq), before.next());
    assert!(updated.iter().all(|u| u.modseq == modseq
        && u.new_flags.is_seen()
        && !u.old_flags.is_seen()));
    assert_eq!(modseq, messages.highest_modseq(&mailbox).unwrap());
    assert_eq!(modseq, fetch(&*messages, &mailbox, Uid::u(2)).modseq);
    assert_eq!(
        Some(Uid::u(3)),
        messages.find_first_unseen_uid(&mailbox).unwrap()
    );

    // Nothing changes, so no MODSEQ is spent.
    assert!(messages
        .update_flags(&mailbox, MessageRange::Range(Uid::u(1), Uid::u(2)), &seen)
        .unwrap()
        .is_empty());
    assert_eq!(modseq, messages.highest_modseq(&mailbox).unwrap());

    let updated = messages
        .update_flags(&mailbox, MessageRange::All, &seen)
        .unwrap();
    assert_eq!(vec![Uid::u(3)], updated.iter().map(|u| u.uid).collect::<Vec<_>>());
    assert_eq!(0, messages.count_unseen(&mailbox).unwrap());
    assert_eq!(None, messages.find_first_unseen_uid(&mailbox).unwrap());

    let replaced = messages
        .update_flags(
            &mailbox,
            MessageRange::One(Uid::u(1)),
            &FlagsUpdate::replace(
                Flags::new().with(Flag::Keyword("work".to_owned())),
            ),
        )
        .unwrap();
    assert_eq!(1, replaced.len());
    assert!(!replaced[0].new_flags.is_seen());
    assert_eq!(
        replaced[0].new_flags,
        fetch(&*messages, &mailbox, Uid::u(1)).flags
    );
}

fn expunge_marked_for_deletion(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");
    let deleted = Flags::new().with(Flag::Deleted);
    messages
        .append(&mailbox, message("a").with_flags(deleted.clone()))
        .unwrap();
    messages.append(&mailbox, message("b")).unwrap();
    messages
        .append(&mailbox, message("c").with_flags(deleted))
        .unwrap();

    let first = messages
        .expunge_marked_for_deletion(
            &mailbox,
            MessageRange::Range(Uid::u(1), Uid::u(2)),
        )
        .unwrap();
    assert_eq!(vec![Uid::u(1)], first.iter().map(|m| m.uid).collect::<Vec<_>>());

    let rest = messages
        .expunge_marked_for_deletion(&mailbox, MessageRange::All)
        .unwrap();
    assert_eq!(vec![Uid::u(3)], rest.iter().map(|m| m.uid).collect::<Vec<_>>());
    assert_eq!(vec![Uid::u(2)], all_uids(&*messages, &mailbox));
}

fn copy_and_move(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let inbox = create(provider, "INBOX");
    let archive = create(provider, "Archive");

    let appended = messages.append(&inbox, message("hello")).unwrap();
    let original = fetch(&*messages, &inbox, appended.uid);

    let copied = messages.copy(&archive, &original).unwrap();
    assert_eq!(appended.message_id, copied.message_id);
    assert_eq!(Uid::u(1), copied.uid);
    assert!(copied.flags.is_recent());
    assert_eq!(vec![Uid::u(1)], messages.find_recent_uids(&archive).unwrap());
    assert!(messages.find_recent_uids(&inbox).unwrap().is_empty());
    assert_eq!(1, messages.count_recent(&archive).unwrap());
    assert_eq!(0, messages.count_recent(&inbox).unwrap());

    let moved = messages.move_to(&archive, &original).unwrap();
    assert_eq!(Uid::u(2), moved.uid);
    assert_eq!(appended.message_id, moved.message_id);
    assert_eq!(0, messages.count_messages(&inbox).unwrap());
    assert_eq!(2, messages.count_messages(&archive).unwrap());
    assert_eq!(
        Some(b"hello".to_vec()),
        fetch(&*messages, &archive, Uid::u(2)).content
    );

    assert_matches!(
        Err(Error::NxMessage(_)),
        messages.copy(&archive, &original),
    );
    assert_matches!(
        Err(Error::NxMessage(_)),
        messages.move_to(&archive, &original),
    );
    assert_matches!(
        Err(Error::NxMessage(_)),
        messages.delete(&inbox, &original),
    );
    // The failed move left the target alone.
    assert_eq!(2, messages.count_messages(&archive).unwrap());
    assert_eq!(Some(Uid::u(2)), messages.last_uid(&archive).unwrap());
}

fn rename_modes(provider: &dyn MapperProvider) {
    let mailboxes = provider.create_mailbox_mapper().unwrap();
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "Drafts");
    for body in ["a", "b", "c"] {
        messages.append(&mailbox, message(body)).unwrap();
    }
    messages.expunge(&mailbox, &UidSet::just(Uid::u(1))).unwrap();

    let preserved = mailboxes
        .rename(&mailbox, &path("Work"), RenameMode::Preserve)
        .unwrap();
    assert_eq!(mailbox.id, preserved.id);
    assert_eq!(path("Work"), preserved.path);
    assert_eq!(mailbox.uid_validity, preserved.uid_validity);
    assert_eq!(Some(Uid::u(3)), preserved.last_uid);
    assert_eq!(vec![Uid::u(2), Uid::u(3)], all_uids(&*messages, &preserved));
    assert_matches!(
        Err(Error::NxMailbox(_)),
        mailboxes.find_by_path(&path("Drafts")),
    );
    assert_eq!(preserved, mailboxes.find_by_path(&path("Work")).unwrap());

    let other = create(provider, "Other");
    assert_matches!(
        Err(Error::MailboxExists(_)),
        mailboxes.rename(&preserved, &other.path, RenameMode::Preserve),
    );

    let reset = mailboxes
        .rename(&preserved, &path("Reset"), RenameMode::ResetUidValidity)
        .unwrap();
    assert_eq!(mailbox.id, reset.id);
    assert!(reset.uid_validity > other.uid_validity);
    assert_eq!(Some(Uid::u(2)), reset.last_uid);
    assert_eq!(vec![Uid::u(1), Uid::u(2)], all_uids(&*messages, &reset));
    assert_eq!(
        Some(b"b".to_vec()),
        fetch(&*messages, &reset, Uid::u(1)).content
    );
    assert_eq!(Uid::u(3), messages.append(&reset, message("d")).unwrap().uid);
}

fn mailbox_queries(provider: &dyn MapperProvider) {
    let mailboxes = provider.create_mailbox_mapper().unwrap();
    let names = ["INBOX", "Work", "Work.Projects", "Work.Projects.2024", "Personal"];
    let created = names
        .iter()
        .map(|name| create(provider, name))
        .collect::<Vec<_>>();
    let bob = mailboxes
        .create(&MailboxPath::inbox("bob").unwrap())
        .unwrap();

    let names_matching = |user: &str, pattern: &str| {
        mailboxes
            .find_with_path_like(&MailboxQuery::for_user(user, pattern))
            .unwrap()
            .into_iter()
            .map(|m| m.path.name)
            .collect::<Vec<_>>()
    };
    assert_eq!(vec!["Work"], names_matching("alice", "Work%"));
    assert_eq!(
        vec!["Work.Projects", "Work.Projects.2024"],
        names_matching("alice", "Work.*")
    );
    assert_eq!(names.to_vec(), names_matching("alice", "*"));
    assert_eq!(vec!["INBOX"], names_matching("bob", "*"));
    assert!(names_matching("carol", "*").is_empty());

    let delimiter = MailboxPath::DELIMITER;
    assert!(mailboxes.has_children(&created[1], delimiter).unwrap());
    assert!(mailboxes.has_children(&created[2], delimiter).unwrap());
    assert!(!mailboxes.has_children(&created[3], delimiter).unwrap());
    assert!(!mailboxes.has_children(&created[4], delimiter).unwrap());
    assert!(!mailboxes.has_children(&bob, delimiter).unwrap());

    let listed = mailboxes.list().unwrap();
    assert_eq!(6, listed.len());
    assert!(listed.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(bob, mailboxes.find_by_path(&bob.path).unwrap());
    assert_matches!(
        Err(Error::MailboxExists(_)),
        mailboxes.create(&path("Work")),
    );
}

fn annotations(provider: &dyn MapperProvider) {
    if !provider
        .supported_capabilities()
        .contains(Capabilities::ANNOTATION)
    {
        return;
    }

    let mailboxes = provider.create_mailbox_mapper().unwrap();
    let messages = provider.create_message_mapper().unwrap();
    let annotations = provider.create_annotation_mapper().unwrap();
    let mailbox = create(provider, "INBOX");
    let modseq = messages.highest_modseq(&mailbox).unwrap();

    let key = |k: &str| AnnotationKey::new(k).unwrap();
    for (k, v) in [
        ("/private/comment", "first"),
        ("/private/comment/author", "alice"),
        ("/private/comment/author/email", "alice@example.com"),
        ("/shared/comment", "public"),
        ("/PRIVATE/Comment", "second"),
    ] {
        annotations
            .upsert(&mailbox, &Annotation::new(key(k), v))
            .unwrap();
    }

    assert_eq!(4, annotations.count(&mailbox).unwrap());
    assert_eq!(
        vec![
            "/private/comment",
            "/private/comment/author",
            "/private/comment/author/email",
            "/shared/comment",
        ],
        annotations
            .get_all(&mailbox)
            .unwrap()
            .iter()
            .map(|a| a.key.as_str().to_owned())
            .collect::<Vec<_>>()
    );
    assert_eq!(
        vec![Annotation::new(key("/private/comment"), "second")],
        annotations
            .get_by_keys(&mailbox, &[key("/private/comment")])
            .unwrap()
    );

    let depth_keys = |found: Vec<Annotation>| {
        found
            .into_iter()
            .map(|a| a.key.as_str().to_owned())
            .collect::<Vec<_>>()
    };
    assert_eq!(
        vec!["/private/comment", "/private/comment/author"],
        depth_keys(
            annotations
                .get_by_keys_with_one_depth(&mailbox, &[key("/private/comment")])
                .unwrap()
        )
    );
    assert_eq!(
        vec![
            "/private/comment",
            "/private/comment/author",
            "/private/comment/author/email",
        ],
        depth_keys(
            annotations
                .get_by_keys_with_all_depth(&mailbox, &[key("/private/comment")])
                .unwrap()
        )
    );
    assert!(annotations
        .get_by_keys_with_all_depth(&mailbox, &[key("/private/comm")])
        .unwrap()
        .is_empty());

    assert!(annotations
        .exists(&mailbox, &key("/shared/comment"))
        .unwrap());
    annotations
        .delete(&mailbox, &key("/shared/comment"))
        .unwrap();
    assert!(!annotations
        .exists(&mailbox, &key("/shared/comment"))
        .unwrap());
    // Deleting an absent key is not an error.
    annotations
        .delete(&mailbox, &key("/shared/comment"))
        .unwrap();
    assert_eq!(3, annotations.count(&mailbox).unwrap());

    // Annotations are not change-tracked.
    assert_eq!(modseq, messages.highest_modseq(&mailbox).unwrap());

    mailboxes.delete(&mailbox).unwrap();
    assert_matches!(
        Err(Error::NxMailbox(_)),
        annotations.get_all(&mailbox),
    );
    assert_matches!(
        Err(Error::NxMailbox(_)),
        annotations.upsert(&mailbox, &Annotation::new(key("/a"), "b")),
    );
}

fn message_id_mapper(provider: &dyn MapperProvider) {
    if !provider
        .supported_capabilities()
        .contains(Capabilities::UNIQUE_MESSAGE_ID)
    {
        assert_matches!(
            Err(Error::Unsupported { .. }),
            provider.create_message_id_mapper().map(|_| ()),
        );
        return;
    }

    let messages = provider.create_message_mapper().unwrap();
    let ids = provider.create_message_id_mapper().unwrap();
    let inbox = create(provider, "INBOX");
    let archive = create(provider, "Archive");

    messages.append(&inbox, message("unrelated")).unwrap();
    let appended = messages.append(&inbox, message("shared")).unwrap();
    let original = fetch(&*messages, &inbox, appended.uid);
    messages.copy(&archive, &original).unwrap();
    let id = appended.message_id;

    let found = ids.find(&[id], FetchGroup::Metadata).unwrap();
    assert_eq!(
        vec![(inbox.id, Uid::u(2)), (archive.id, Uid::u(1))],
        found
            .iter()
            .map(|m| (m.mailbox_id, m.uid))
            .collect::<Vec<_>>()
    );
    assert!(found.iter().all(|m| m.content.is_none()));
    assert_eq!(vec![inbox.id, archive.id], ids.find_mailboxes(id).unwrap());

    // Unknown ids are skipped as long as one id is known.
    assert_eq!(
        found.len(),
        ids.find(&[MessageId(9999), id], FetchGroup::Metadata)
            .unwrap()
            .len()
    );
    assert_matches!(
        Err(Error::NxMessage(_)),
        ids.find(&[MessageId(9999)], FetchGroup::Metadata),
    );
    assert!(ids.find(&[], FetchGroup::Metadata).unwrap().is_empty());

    // Each mailbox stamps its own instance with its own MODSEQ.
    let flagged = FlagsUpdate::add(Flags::new().with(Flag::Flagged));
    let updated = ids.set_flags(id, &[], &flagged).unwrap();
    assert_eq!(2, updated.len());
    assert_eq!(1, updated[&inbox.id].len());
    assert_eq!(
        messages.highest_modseq(&inbox).unwrap(),
        updated[&inbox.id][0].modseq
    );
    assert_eq!(
        messages.highest_modseq(&archive).unwrap(),
        updated[&archive.id][0].modseq
    );
    assert_ne!(
        updated[&inbox.id][0].modseq,
        updated[&archive.id][0].modseq
    );

    let unflagged = FlagsUpdate::remove(Flags::new().with(Flag::Flagged));
    let updated = ids.set_flags(id, &[archive.id], &unflagged).unwrap();
    assert_eq!(vec![archive.id], updated.keys().copied().collect::<Vec<_>>());
    assert!(fetch(&*messages, &inbox, Uid::u(2)).flags.contains(&Flag::Flagged));

    ids.delete_in(id, &[inbox.id]).unwrap();
    assert_eq!(vec![archive.id], ids.find_mailboxes(id).unwrap());
    assert_eq!(vec![Uid::u(1)], all_uids(&*messages, &inbox));

    ids.delete(id).unwrap();
    assert_matches!(
        Err(Error::NxMessage(_)),
        ids.find(&[id], FetchGroup::Full),
    );
    assert_matches!(Err(Error::NxMessage(_)), ids.find_mailboxes(id));
    assert_matches!(
        Err(Error::NxMessage(_)),
        ids.set_flags(id, &[], &flagged).map(|_| ()),
    );
}

fn message_id_copies_within_one_mailbox(provider: &dyn MapperProvider) {
    if !provider
        .supported_capabilities()
        .contains(Capabilities::UNIQUE_MESSAGE_ID)
    {
        return;
    }

    let messages = provider.create_message_mapper().unwrap();
    let ids = provider.create_message_id_mapper().unwrap();
    let inbox = create(provider, "INBOX");

    let appended = messages.append(&inbox, message("twice")).unwrap();
    let original = fetch(&*messages, &inbox, appended.uid);
    messages.copy(&inbox, &original).unwrap();
    let id = appended.message_id;
    let before = messages.highest_modseq(&inbox).unwrap();

    let flagged = FlagsUpdate::add(Flags::new().with(Flag::Flagged));
    let updated = ids.set_flags(id, &[], &flagged).unwrap();
    let after = messages.highest_modseq(&inbox).unwrap();
    assert_eq!(Some(after), before.next());
    assert_eq!(
        vec![(Uid::u(1), after), (Uid::u(2), after)],
        updated[&inbox.id]
            .iter()
            .map(|u| (u.uid, u.modseq))
            .collect::<Vec<_>>()
    );

    ids.delete(id).unwrap();
    assert_eq!(after.next(), Some(messages.highest_modseq(&inbox).unwrap()));
    assert!(all_uids(&*messages, &inbox).is_empty());
}

fn attachments(provider: &dyn MapperProvider) {
    if !provider
        .supported_capabilities()
        .contains(Capabilities::ATTACHMENT)
    {
        assert_matches!(
            Err(Error::Unsupported {
                operation: "create_attachment_mapper"
            }),
            provider.create_attachment_mapper().map(|_| ()),
        );
        return;
    }

    let attachments = provider.create_attachment_mapper().unwrap();
    let attachment = Attachment {
        id: AttachmentId("a1".to_owned()),
        content_type: "image/png".to_owned(),
        bytes: vec![1, 2, 3],
    };
    attachments.store(&attachment).unwrap();
    assert_eq!(attachment, attachments.get(&attachment.id).unwrap());
    assert_eq!(3, attachments.get(&attachment.id).unwrap().size());

    let missing = AttachmentId("missing".to_owned());
    assert_matches!(Err(Error::NxAttachment(_)), attachments.get(&missing));
    assert_eq!(
        vec![attachment.clone()],
        attachments
            .get_many(&[missing, attachment.id.clone()])
            .unwrap()
    );

    let replacement = Attachment {
        bytes: vec![4],
        ..attachment.clone()
    };
    attachments.store(&replacement).unwrap();
    assert_eq!(replacement, attachments.get(&attachment.id).unwrap());
}

fn clear_removes_everything_but_counters(provider: &dyn MapperProvider) {
    let mailboxes = provider.create_mailbox_mapper().unwrap();
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");
    messages.append(&mailbox, message("a")).unwrap();

    provider.clear().unwrap();
    assert!(mailboxes.list().unwrap().is_empty());
    assert_matches!(
        Err(Error::NxMailbox(_)),
        messages.count_messages(&mailbox),
    );

    let again = create(provider, "INBOX");
    assert_ne!(mailbox.id, again.id);
    assert!(again.uid_validity > mailbox.uid_validity);
    assert_eq!(None, again.last_uid);
}

fn generated_message_ids_increase(provider: &dyn MapperProvider) {
    let messages = provider.create_message_mapper().unwrap();
    let mailbox = create(provider, "INBOX");

    let a = provider.generate_message_id().unwrap();
    let b = provider.generate_message_id().unwrap();
    assert!(b > a);

    let appended = messages
        .append(&mailbox, message("pinned").with_message_id(a))
        .unwrap();
    assert_eq!(a, appended.message_id);

    let fresh = messages.append(&mailbox, message("fresh")).unwrap();
    assert!(fresh.message_id > b);
}
