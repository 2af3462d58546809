use cloud_remote::{
    build_tree, Error, FetchedContent, ItemId, MemoryProvider, RemoteListing, RemoteProvider,
    Result, SecretString, Session,
};
use std::collections::HashMap;

fn session(provider: &dyn RemoteProvider) -> Session {
    provider
        .authenticate("student@example.com", &SecretString::new("pw".to_string()))
        .unwrap()
}

#[test]
fn tree_mirrors_provider_listing() {
    let provider = MemoryProvider::new()
        .folder("/CS101", "cs101")
        .file("/CS101/syllabus.pdf", "42", "%PDF-1.4", Some("application/pdf"))
        .folder("/CS101/Labs", "labs")
        .file("/CS101/Labs/lab1.txt", "43", "lab one", None)
        .folder("/MATH", "math");

    let tree = build_tree(&provider, &session(&provider)).unwrap();

    assert_eq!(tree.path, "/");
    let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["CS101", "MATH"]);

    let course = tree.find("/CS101").unwrap();
    assert!(course.is_folder);
    let course_children: Vec<&str> = course.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(course_children, vec!["syllabus.pdf", "Labs"]);

    let syllabus = tree.find("/CS101/syllabus.pdf").unwrap();
    assert_eq!(syllabus.identifier, ItemId::new("42"));
    assert_eq!(syllabus.parent_identifier, Some(ItemId::new("cs101")));
    assert!(!syllabus.is_folder);

    let lab = tree.find("/CS101/Labs/lab1.txt").unwrap();
    assert_eq!(lab.parent_identifier, Some(ItemId::new("labs")));
    assert_eq!(tree.len(), 6);
}

#[test]
fn every_path_ends_with_its_name() {
    let provider = MemoryProvider::new()
        .file("/a/b/c/d.txt", "d", "", None)
        .file("/a/e.txt", "e", "", None);
    let tree = build_tree(&provider, &session(&provider)).unwrap();

    for item in tree.walk().skip(1) {
        assert!(item.path.ends_with(&format!("/{}", item.name)), "{}", item.path);
    }
}

#[test]
fn listing_failure_aborts_the_build() {
    let provider = MemoryProvider::new()
        .folder("/ok", "ok")
        .folder("/broken", "broken")
        .file("/broken/x.txt", "x", "x", None);
    provider.fail_listing("broken");

    let err = build_tree(&provider, &session(&provider)).unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

/// Provider returning a fixed listing per folder, used for naming edge cases.
struct ScriptedProvider {
    listings: HashMap<ItemId, Vec<RemoteListing>>,
}

impl RemoteProvider for ScriptedProvider {
    fn root_id(&self) -> ItemId {
        ItemId::new("root")
    }

    fn authenticate(&self, identity: &str, _secret: &SecretString) -> Result<Session> {
        Ok(Session::new(identity, SecretString::new("t".to_string())))
    }

    fn list_children(&self, _session: &Session, folder: &ItemId) -> Result<Vec<RemoteListing>> {
        Ok(self.listings.get(folder).cloned().unwrap_or_default())
    }

    fn fetch_content(&self, _session: &Session, id: &ItemId) -> Result<FetchedContent> {
        Err(Error::NotFound(id.clone()))
    }
}

#[test]
fn duplicate_and_unsafe_names_get_unique_paths() {
    let mut listings = HashMap::new();
    listings.insert(
        ItemId::new("root"),
        vec![
            RemoteListing::file("1", "notes.txt"),
            RemoteListing::file("2", "notes.txt"),
            RemoteListing::file("3", "a/b.txt"),
            RemoteListing::folder("4", ""),
        ],
    );
    let provider = ScriptedProvider { listings };

    let tree = build_tree(&provider, &session(&provider)).unwrap();
    let paths: Vec<&str> = tree.children.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["/notes.txt", "/notes (2).txt", "/a_b.txt", "/unnamed"]
    );
}

#[test]
fn repeated_folder_is_not_expanded_twice() {
    let mut listings = HashMap::new();
    listings.insert(ItemId::new("root"), vec![RemoteListing::folder("loop", "loop")]);
    listings.insert(
        ItemId::new("loop"),
        vec![
            RemoteListing::folder("loop", "again"),
            RemoteListing::file("f", "f.txt"),
        ],
    );
    let provider = ScriptedProvider { listings };

    let tree = build_tree(&provider, &session(&provider)).unwrap();
    let again = tree.find("/loop/again").unwrap();
    assert!(again.is_folder);
    assert!(again.children.is_empty());
    assert!(tree.find("/loop/f.txt").is_some());
}
