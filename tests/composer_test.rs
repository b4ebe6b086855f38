//! Integration tests for the composer driver.
//!
//! Every test checks both the assembled tree and that the registry holds no
//! trace of the invocation afterwards.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rstest::rstest;

use treecompose::util::testing::init_test_setup;
use treecompose::{
    from_fn, once, script, BuilderResultExt, Children, Composable, ComposeError, ComposeResult,
    Composer, Content, DomainError, Element, Event, Invocation, Produced, Render, ScopeGuard,
    Script, Settings,
};

/// Children rendered as strings: text as is, elements as `<tag>`.
fn labels(element: &Element) -> Vec<String> {
    element
        .children
        .iter()
        .map(|child| match child {
            Content::Text(text) => text.clone(),
            Content::Element(inner) => format!("<{}>", inner.tag),
        })
        .collect()
}

fn open(tag: &str) -> Event<Element> {
    Event::Open(Element::new(tag))
}

// ============================================================
// Attachment
// ============================================================

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(7)]
fn given_n_children_in_one_scope_when_running_then_scope_has_n_children_in_order(
    #[case] n: usize,
) {
    init_test_setup();
    // Arrange
    let composer: Composer<Element> = Composer::new();
    let mut events = vec![open("ul")];
    events.extend((0..n).map(|i| Event::child(format!("item{}", i))));
    events.push(Event::Close);

    // Act
    let composition = composer.run(script(events)).expect("composition");

    // Assert
    let root = composition.root().expect("root");
    let expected: Vec<String> = (0..n).map(|i| format!("item{}", i)).collect();
    assert_eq!(root.children.len(), n);
    assert_eq!(labels(root), expected);
    assert!(!composer.registry().contains(composition.token()));
}

#[test]
fn given_nested_scopes_when_running_then_tree_mirrors_nesting() {
    init_test_setup();
    // Arrange: S1 { a, S2 { b }, c }
    let composer: Composer<Element> = Composer::new();
    let events = vec![
        open("s1"),
        Event::child("a"),
        open("s2"),
        Event::child("b"),
        Event::Close,
        Event::child("c"),
        Event::Close,
    ];

    // Act
    let composition = composer.run(script(events)).expect("composition");

    // Assert
    assert_eq!(composition.roots().len(), 1);
    let s1 = composition.root().expect("root");
    assert_eq!(s1.tag, "s1");
    assert_eq!(labels(s1), vec!["a", "<s2>", "c"]);
    let s2 = s1.find("s2").expect("s2");
    assert_eq!(s2.children, Children::Many(vec![Content::from("b")]));
    assert!(composer.registry().is_empty());
}

#[test]
fn given_inner_scope_closed_when_producing_then_child_attaches_to_outer() {
    init_test_setup();
    // Arrange: open A, open B, close B, then produce v
    let composer: Composer<Element> = Composer::new();
    let mut outer: Option<ScopeGuard<Element>> = None;
    let mut step = 0;
    let render = from_fn(move |inv: &Invocation<Element>| {
        step += 1;
        if step == 1 {
            outer = Some(inv.open(Element::new("a"))?);
            let inner = inv.open(Element::new("b"))?;
            inner.close()?;
            return Ok(Produced::Child(Content::from("v")));
        }
        if let Some(guard) = outer.take() {
            guard.close()?;
        }
        Ok(Produced::Finished(()))
    });

    // Act
    let composition = composer.run(render).expect("composition");

    // Assert
    let a = composition.root().expect("root");
    assert_eq!(labels(a), vec!["<b>", "v"]);
    assert!(a.find("b").expect("b").children.is_empty());
}

#[test]
fn given_sibling_top_level_scopes_when_running_then_roots_keep_open_order() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();
    let events = vec![
        open("first"),
        Event::child("1"),
        Event::Close,
        open("second"),
        Event::Close,
    ];

    let composition = composer.run(script(events)).expect("composition");

    let tags: Vec<&str> = composition
        .roots()
        .iter()
        .map(|r| r.tag.as_str())
        .collect();
    assert_eq!(tags, vec!["first", "second"]);
    assert_eq!(composition.root().expect("root").text(), "1");
}

#[test]
fn given_scope_nodes_when_opening_then_each_is_attached_before_its_children() {
    init_test_setup();
    // Arrange: the outer scope is opened, then produces v before a nested scope
    let composer: Composer<Element> = Composer::new();
    let events = vec![
        open("outer"),
        Event::child("v"),
        open("inner"),
        Event::child("w"),
        Event::Close,
        Event::child("x"),
        Event::Close,
    ];
    let mut driver = composer.start(script(events));

    // Act: pull v and w only
    assert!(driver.step().expect("v").is_none());
    assert!(driver.step().expect("w").is_none());
    let outline = driver.invocation().outline();

    // Assert: inner was attached when opened, between v and its own child
    assert_eq!(outline.len(), 1);
    let rendered = outline[0].to_string();
    let v = rendered.find("\"v\"").expect("v rendered");
    let inner = rendered.find("inner").expect("inner rendered");
    let w = rendered.find("\"w\"").expect("w rendered");
    assert!(v < inner && inner < w, "{}", rendered);
    assert_eq!(driver.attached(), 2);
}

// ============================================================
// Unscoped production and registry lifecycle
// ============================================================

#[test]
fn given_bare_child_without_scope_when_running_then_fails_and_retires_entry() {
    init_test_setup();
    // Arrange
    let composer: Composer<Element> = Composer::new();

    // Act
    let err = composer
        .run(script(vec![Event::child("x")]))
        .expect_err("bare child");

    // Assert
    assert!(matches!(
        err,
        ComposeError::Domain(DomainError::UnscopedProduction { .. })
    ));
    assert!(composer.registry().is_empty());
}

#[test]
fn given_unscoped_production_when_stepping_then_driver_is_finished_and_token_gone() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();
    let mut driver = composer.start(script(vec![
        Event::child("x"),
        open("never"),
        Event::Close,
    ]));
    let token = driver.token();
    assert!(composer.registry().contains(token));

    let first = driver.step();
    let second = driver.step();

    assert!(first.is_err());
    assert!(driver.is_finished());
    assert!(matches!(second, Err(ComposeError::Finished { .. })));
    assert_eq!(driver.attached(), 0);
    assert!(!composer.registry().contains(token));
}

#[test]
fn given_many_runs_when_all_finished_then_registry_is_empty() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();

    for i in 0..10 {
        let events = if i % 2 == 0 {
            vec![open("ok"), Event::child("fine"), Event::Close]
        } else {
            vec![Event::child("stray")]
        };
        let _ = composer.run(script(events));
    }

    assert!(composer.registry().is_empty());
    assert!(composer.registry().live().is_empty());
}

#[test]
fn given_driver_dropped_mid_run_when_dropping_then_entry_retired() {
    init_test_setup();
    // Arrange
    let composer: Composer<Element> = Composer::new();
    let mut driver = composer.start(script(vec![
        open("div"),
        Event::child("a"),
        Event::child("b"),
        Event::Close,
    ]));
    assert!(driver.step().expect("a").is_none());
    let token = driver.token();
    assert_eq!(composer.registry().live(), vec![token]);

    // Act
    drop(driver);

    // Assert
    assert!(!composer.registry().contains(token));
}

#[test]
fn given_panicking_builder_when_running_then_entry_retired() {
    init_test_setup();
    // Arrange
    let composer: Composer<Element> = Composer::new();
    let runner = composer.clone();

    // Act
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        runner.run(from_fn(
            |inv: &Invocation<Element>| -> ComposeResult<Produced<Content, ()>> {
                let _guard = inv.open(Element::new("div"))?;
                panic!("builder exploded");
            },
        ))
    }));

    // Assert
    assert!(result.is_err());
    assert!(composer.registry().is_empty());
}

#[test]
fn given_builder_error_when_running_then_error_surfaces_with_context() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();

    let err = composer
        .run(once(|inv: &Invocation<Element>| {
            inv.scope(Element::new("count"), |inv| {
                let count = "many".parse::<usize>().with_builder_context("parse count")?;
                inv.emit(count.to_string())
            })
        }))
        .expect_err("parse failure");

    match err {
        ComposeError::Builder { context, .. } => assert_eq!(context, "parse count"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(composer.registry().is_empty());
}

// ============================================================
// Concurrency, interleaving and nesting
// ============================================================

#[test]
fn given_threads_when_running_concurrently_then_trees_are_disjoint() {
    init_test_setup();
    // Arrange
    const THREADS: usize = 8;
    const CHILDREN: usize = 50;
    let composer: Composer<Element> = Composer::new();
    let barrier = Arc::new(Barrier::new(THREADS));

    // Act
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let composer = composer.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut produced = 0;
                let mut root: Option<ScopeGuard<Element>> = None;
                composer.run(from_fn(move |inv: &Invocation<Element>| {
                    if produced == 0 && root.is_none() {
                        let node = Element::new("div").with_prop("id", t.to_string());
                        root = Some(inv.open(node)?);
                    }
                    thread::yield_now();
                    if produced < CHILDREN {
                        produced += 1;
                        return Ok(Produced::Child(format!("{}-{}", t, produced).into()));
                    }
                    if let Some(guard) = root.take() {
                        guard.close()?;
                    }
                    Ok(Produced::Finished(t))
                }))
            })
        })
        .collect();

    // Assert
    for (t, handle) in handles.into_iter().enumerate() {
        let composition = handle.join().expect("thread").expect("composition");
        assert_eq!(*composition.output(), t);
        let root = composition.root().expect("root");
        assert_eq!(root.props.get("id"), Some(&t.to_string()));
        let expected: Vec<String> = (1..=CHILDREN).map(|i| format!("{}-{}", t, i)).collect();
        assert_eq!(labels(root), expected);
    }
    assert!(composer.registry().is_empty());
}

#[test]
fn given_two_drivers_when_interleaved_on_one_thread_then_trees_do_not_mix() {
    init_test_setup();
    // Arrange
    let composer: Composer<Element> = Composer::new();
    let mut left = composer.start(script(vec![
        open("left"),
        Event::child("l1"),
        Event::child("l2"),
        Event::child("l3"),
        Event::Close,
    ]));
    let mut right = composer.start(script(vec![
        open("right"),
        Event::child("r1"),
        open("span"),
        Event::child("r2"),
        Event::Close,
        Event::child("r3"),
        Event::Close,
    ]));
    assert_ne!(left.token(), right.token());
    assert_eq!(composer.registry().len(), 2);

    // Act
    let mut left_done = None;
    let mut right_done = None;
    while left_done.is_none() || right_done.is_none() {
        if left_done.is_none() {
            left_done = left.step().expect("left step");
        }
        if right_done.is_none() {
            right_done = right.step().expect("right step");
        }
    }

    // Assert
    let left_root = left_done.expect("left").into_root().expect("left root");
    let right_root = right_done.expect("right").into_root().expect("right root");
    assert_eq!(labels(&left_root), vec!["l1", "l2", "l3"]);
    assert_eq!(labels(&right_root), vec!["r1", "<span>", "r3"]);
    assert_eq!(right_root.text(), "r1r2r3");
    assert!(composer.registry().is_empty());
}

/// Section that, while suspended inside its own scope, runs a nested
/// invocation of itself and embeds the result.
struct Section {
    composer: Composer<Element>,
    depth: usize,
    state: u8,
    guard: Option<ScopeGuard<Element>>,
    peak: Arc<AtomicUsize>,
}

impl Section {
    fn new(composer: Composer<Element>, depth: usize, peak: Arc<AtomicUsize>) -> Self {
        Self {
            composer,
            depth,
            state: 0,
            guard: None,
            peak,
        }
    }
}

impl Render<Element> for Section {
    type Output = usize;

    fn resume(&mut self, inv: &Invocation<Element>) -> ComposeResult<Produced<Content, usize>> {
        self.state += 1;
        match self.state {
            1 => {
                let node = Element::new("section").with_prop("depth", self.depth.to_string());
                self.guard = Some(inv.open(node)?);
                Ok(Produced::Child(format!("before-{}", self.depth).into()))
            }
            2 if self.depth > 0 => {
                let nested = Section::new(self.composer.clone(), self.depth - 1, self.peak.clone());
                let composition = self.composer.run(nested)?;
                let token = inv.token();
                let section = composition
                    .into_root()
                    .ok_or(DomainError::UnscopedProduction { token })?;
                Ok(Produced::Child(section.into()))
            }
            2 => {
                let live = self.composer.registry().len();
                self.peak.fetch_max(live, Ordering::SeqCst);
                Ok(Produced::Child("leaf".into()))
            }
            3 => Ok(Produced::Child(format!("after-{}", self.depth).into())),
            _ => {
                if let Some(guard) = self.guard.take() {
                    guard.close()?;
                }
                Ok(Produced::Finished(self.depth))
            }
        }
    }
}

fn child_section(element: &Element) -> Option<&Element> {
    element.elements().find(|child| child.tag == "section")
}

#[test]
fn given_builder_running_nested_invocation_when_resumed_then_each_keeps_its_stack() {
    init_test_setup();
    // Arrange
    let composer: Composer<Element> = Composer::new();
    let peak = Arc::new(AtomicUsize::new(0));

    // Act
    let composition = composer
        .run(Section::new(composer.clone(), 2, peak.clone()))
        .expect("composition");

    // Assert
    let outer = composition.root().expect("root");
    assert_eq!(labels(outer), vec!["before-2", "<section>", "after-2"]);
    let middle = child_section(outer).expect("middle");
    assert_eq!(middle.props.get("depth").map(String::as_str), Some("1"));
    assert_eq!(labels(middle), vec!["before-1", "<section>", "after-1"]);
    let inner = child_section(middle).expect("inner");
    assert_eq!(labels(inner), vec!["before-0", "leaf", "after-0"]);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert!(composer.registry().is_empty());
}

// ============================================================
// Completion rules and limits
// ============================================================

#[test]
fn given_unclosed_scope_when_lenient_then_scope_closes_at_completion() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();

    let composition = composer
        .run(script(vec![open("div"), Event::child("a")]))
        .expect("composition");

    assert_eq!(composition.root().expect("root").text(), "a");
    assert!(composer.registry().is_empty());
}

#[test]
fn given_unclosed_scope_when_strict_then_reports_unclosed_scopes() {
    init_test_setup();
    let composer = Composer::with_settings(Settings {
        strict_completion: true,
        ..Settings::default()
    });

    let err = composer
        .run(script(vec![open("div"), open("span"), Event::child("a")]))
        .expect_err("unclosed");

    assert!(matches!(err, ComposeError::UnclosedScopes { depth: 2, .. }));
    assert!(composer.registry().is_empty());
}

#[rstest]
#[case(1, false)]
#[case(2, false)]
#[case(3, true)]
fn given_depth_limit_when_opening_scopes_then_rejects_beyond_limit(
    #[case] nesting: usize,
    #[case] rejected: bool,
) {
    init_test_setup();
    let composer = Composer::with_settings(Settings {
        max_depth: 2,
        ..Settings::default()
    });
    let mut events: Vec<Event<Element>> = (0..nesting).map(|_| open("div")).collect();
    events.push(Event::child("deep"));
    events.extend((0..nesting).map(|_| Event::Close));

    let result = composer.run(script(events));

    assert_eq!(result.is_err(), rejected);
    if let Err(err) = result {
        assert!(matches!(
            err,
            ComposeError::Domain(DomainError::DepthExceeded { limit: 2, .. })
        ));
    }
    assert!(composer.registry().is_empty());
}

#[test]
fn given_close_without_open_when_running_script_then_reports_unbalanced_close() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();

    let err = composer
        .run(script(vec![Event::Close]))
        .expect_err("unbalanced");

    assert!(matches!(err, ComposeError::UnbalancedClose { .. }));
}

// ============================================================
// Producer adapters
// ============================================================

#[test]
fn given_eager_builder_when_running_once_then_scopes_and_output_are_kept() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();

    let composition = composer
        .run(once(|inv: &Invocation<Element>| {
            inv.scope(Element::new("table"), |inv| {
                for row in 0..3 {
                    inv.scope(Element::new("tr"), |inv| inv.emit(format!("row{}", row)))?;
                }
                inv.with_current(|table| table.set_prop("rows", "3"))?;
                Ok(3usize)
            })
        }))
        .expect("composition");

    assert_eq!(*composition.output(), 3);
    let table = composition.root().expect("table");
    assert_eq!(table.props.get("rows").map(String::as_str), Some("3"));
    assert_eq!(table.elements().count(), 3);
    assert_eq!(table.text(), "row0row1row2");
}

#[test]
fn given_script_with_result_when_running_then_output_is_returned() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();

    let events = vec![open("p"), Event::child("hi"), Event::Close];
    let composition = composer
        .run(script(events).returning("done"))
        .expect("composition");

    let (roots, output) = composition.into_parts();
    assert_eq!(output, "done");
    assert_eq!(roots.len(), 1);
}

/// Bullet list with one item per name.
struct NameList;

impl Composable<Element> for NameList {
    type Args = Vec<String>;
    type Output = usize;
    type Render = Script<Element, std::vec::IntoIter<Event<Element>>, usize>;

    fn render(&self, names: Vec<String>) -> Self::Render {
        let count = names.len();
        let mut events = vec![open("ul")];
        for name in names {
            events.push(Event::Open(Element::new("li")));
            events.push(Event::child(name));
            events.push(Event::Close);
        }
        events.push(Event::Close);
        script(events).returning(count)
    }
}

#[test]
fn given_composable_when_composing_then_renders_from_args() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();

    let composition = NameList
        .compose(&composer, vec!["ada".to_string(), "grace".to_string()])
        .expect("composition");

    assert_eq!(*composition.output(), 2);
    let list = composition.root().expect("ul");
    let items: Vec<String> = list.elements().map(Element::text).collect();
    assert_eq!(items, vec!["ada", "grace"]);
    assert!(composer.registry().is_empty());
}

#[test]
fn given_independent_producers_when_running_all_then_results_keep_input_order() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();
    let renders: Vec<_> = (0..16usize)
        .map(|i| {
            script(vec![
                Event::Open(Element::new("div").with_prop("id", i.to_string())),
                Event::child(format!("child-{}", i)),
                Event::Close,
            ])
            .returning(i)
        })
        .collect();

    let results = composer.run_all(renders);

    assert_eq!(results.len(), 16);
    for (i, result) in results.into_iter().enumerate() {
        let composition = result.expect("composition");
        assert_eq!(*composition.output(), i);
        assert_eq!(
            composition.root().expect("root").text(),
            format!("child-{}", i)
        );
    }
    assert!(composer.registry().is_empty());
}

#[test]
fn given_builder_with_args_when_running_with_then_builder_sees_registered_invocation() {
    init_test_setup();
    let composer: Composer<Element> = Composer::new();
    let registry_len = Arc::new(AtomicUsize::new(0));
    let observed = registry_len.clone();
    let shared = composer.clone();

    let composition = composer
        .run_with(
            move |title: &str| {
                observed.store(shared.registry().len(), Ordering::SeqCst);
                let events = vec![open("h1"), Event::child(title.to_string()), Event::Close];
                script(events)
            },
            "hello",
        )
        .expect("composition");

    assert_eq!(registry_len.load(Ordering::SeqCst), 1);
    assert_eq!(composition.root().expect("h1").text(), "hello");
}
