use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use dfs::naming::{NamingServer, Registration, Service, ServiceStub};
use dfs::path::Path;
use dfs::rpc::{FaultKind, ListenerOptions};
use dfs::storage::{CommandStub, Storage, StorageServer, StorageStub};
use tempfile::TempDir;
use tokio::time::timeout;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn path(s: &str) -> Path {
    Path::parse(s).unwrap()
}

fn options() -> ListenerOptions {
    ListenerOptions {
        drain_interval: Duration::from_millis(200),
    }
}

fn start_naming() -> (NamingServer, ServiceStub) {
    let naming = NamingServer::new(loopback(), loopback(), options()).unwrap();
    naming.start().unwrap();
    let service = naming.service_stub().unwrap();
    (naming, service)
}

async fn start_storage(naming: &NamingServer, files: &[(&str, &str)]) -> (StorageServer, TempDir) {
    let root = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        let local = root.path().join(name.trim_start_matches('/'));
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(local, contents).unwrap();
    }

    let server = StorageServer::new(root.path(), IpAddr::from([127, 0, 0, 1]), 0, 0, options()).unwrap();
    let registration = naming.registration_stub().unwrap();
    timeout(Duration::from_secs(5), server.start("127.0.0.1", &registration))
        .await
        .expect("timeout starting storage server")
        .unwrap();
    (server, root)
}

async fn shutdown(naming: NamingServer, storage: Vec<StorageServer>) {
    for server in storage {
        server.stop().await;
    }
    naming.stop().await;
}

#[tokio::test]
async fn test_registration_merges_trees_and_removes_duplicates() {
    let (naming, service) = start_naming();
    let (first, first_root) = start_storage(&naming, &[("/a/x.txt", "one"), ("/b.txt", "b")]).await;
    let (second, second_root) =
        start_storage(&naming, &[("/a/x.txt", "two"), ("/c/d.txt", "d")]).await;

    assert_eq!(naming.service().storage_nodes(), 2);
    assert_eq!(service.list(Path::root()).await.unwrap(), vec!["a", "b.txt", "c"]);
    assert_eq!(service.list(path("/a")).await.unwrap(), vec!["x.txt"]);
    assert!(service.is_directory(path("/c")).await.unwrap());
    assert!(!service.is_directory(path("/c/d.txt")).await.unwrap());

    // The second node's copy was a duplicate: deleted and its empty directory pruned
    assert!(first_root.path().join("a/x.txt").is_file());
    assert!(!second_root.path().join("a").exists());
    assert!(second_root.path().join("c/d.txt").is_file());

    // The surviving copy is the first node's
    let storage = service.get_storage(path("/a/x.txt")).await.unwrap();
    assert_eq!(storage.read(path("/a/x.txt"), 0, 3).await.unwrap(), b"one");

    shutdown(naming, vec![first, second]).await;
}

#[tokio::test]
async fn test_create_write_and_read_back() {
    let (naming, service) = start_naming();
    let (storage_server, root) = start_storage(&naming, &[]).await;

    let file = path("/docs/readme.txt");
    assert!(service.create_directory(path("/docs")).await.unwrap());
    assert!(service.create_file(file.clone()).await.unwrap());
    assert!(!service.create_file(file.clone()).await.unwrap());
    assert!(root.path().join("docs/readme.txt").is_file());

    let storage = service.get_storage(file.clone()).await.unwrap();
    storage.write(file.clone(), 0, b"hello world".to_vec()).await.unwrap();
    assert_eq!(storage.size(file.clone()).await.unwrap(), 11);
    assert_eq!(storage.read(file.clone(), 6, 5).await.unwrap(), b"world");

    let err = storage.read(file.clone(), 6, 50).await.unwrap_err();
    assert_eq!(err.fault().map(|f| f.kind), Some(FaultKind::OutOfBounds));

    shutdown(naming, vec![storage_server]).await;
}

#[tokio::test]
async fn test_new_file_goes_to_directory_owner() {
    let (naming, service) = start_naming();
    let (first, first_root) = start_storage(&naming, &[("/one/f", "")]).await;
    let (second, second_root) = start_storage(&naming, &[("/two/f", "")]).await;

    assert!(service.create_file(path("/two/g")).await.unwrap());
    assert!(second_root.path().join("two/g").is_file());
    assert!(!first_root.path().join("two/g").exists());

    let owner = service.get_storage(path("/two/g")).await.unwrap();
    assert_eq!(owner, service.get_storage(path("/two/f")).await.unwrap());

    shutdown(naming, vec![first, second]).await;
}

#[tokio::test]
async fn test_naming_errors_arrive_as_faults() {
    let (naming, service) = start_naming();
    let (storage_server, _root) = start_storage(&naming, &[("/dir/file", "x")]).await;

    let cases = [
        (service.get_storage(path("/dir")).await.map(|_| ()), FaultKind::FileNotFound),
        (service.get_storage(Path::root()).await.map(|_| ()), FaultKind::FileNotFound),
        (service.list(path("/missing")).await.map(|_| ()), FaultKind::FileNotFound),
        (service.create_file(path("/missing/f")).await.map(|_| ()), FaultKind::FileNotFound),
        (service.delete(path("/dir/file")).await.map(|_| ()), FaultKind::Unsupported),
    ];
    for (result, kind) in cases {
        let err = result.unwrap_err();
        assert!(!err.is_rpc_failure());
        assert_eq!(err.fault().map(|f| f.kind), Some(kind));
    }

    shutdown(naming, vec![storage_server]).await;
}

#[tokio::test]
async fn test_registering_same_node_twice_is_refused() {
    let (naming, _service) = start_naming();
    let (storage_server, _root) = start_storage(&naming, &[]).await;

    let client = StorageStub::new(storage_server.client_address().unwrap().into()).unwrap();
    let command = CommandStub::new(storage_server.command_address().unwrap().into()).unwrap();
    let registration = naming.registration_stub().unwrap();

    let err = registration.register(client, command, vec![]).await.unwrap_err();
    assert_eq!(err.fault().map(|f| f.kind), Some(FaultKind::IllegalState));

    shutdown(naming, vec![storage_server]).await;
}

#[tokio::test]
async fn test_create_file_without_storage_is_illegal_state() {
    let (naming, service) = start_naming();

    let err = service.create_file(path("/f")).await.unwrap_err();
    assert_eq!(err.fault().map(|f| f.kind), Some(FaultKind::IllegalState));

    naming.stop().await;
}

#[tokio::test]
async fn test_storage_stops_when_naming_is_unreachable() {
    let (naming, _service) = start_naming();
    let registration = naming.registration_stub().unwrap();
    naming.stop().await;

    let root = tempfile::tempdir().unwrap();
    let server = StorageServer::new(root.path(), IpAddr::from([127, 0, 0, 1]), 0, 0, options()).unwrap();
    let result = server.start("127.0.0.1", &registration).await;
    assert!(result.is_err());
}
