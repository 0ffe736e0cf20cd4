// Full message lifecycle: create -> bind -> install -> unbind -> destroy
// Run with: cargo test --test end_to_end -- --nocapture

use dmxp_bus::Bus::Msg::Message;
use dmxp_bus::Bus::PeerBuilder;
use dmxp_bus::Core::fdtable::FileRef;
use dmxp_bus::Core::handle::Handle;
use dmxp_bus::Core::quota::{User, UserLimits};
use dmxp_bus::Error;
use std::fs::File;
use std::io::IoSlice;
use std::sync::Arc;

fn dev_null() -> FileRef {
    Arc::new(File::open("/dev/null").expect("open /dev/null"))
}

fn limits() -> UserLimits {
    UserLimits {
        max_bytes: 16,
        max_handles: 1,
        max_fds: 2,
    }
}

#[test]
fn test_deliver_message_with_handle_and_two_fds() {
    let peer = PeerBuilder::new()
        .with_id(7)
        .with_pool_size(40)
        .with_max_fds(8)
        .build()
        .unwrap();
    let user = User::with_limits(1000, limits());
    let file_a = dev_null();
    let file_b = dev_null();

    // Create and populate, as the transaction layer would
    let mut message = Message::new(16, 2, 1, false).unwrap();
    message.set_destination(7);
    message.set_credentials(1000, 1000, 1234, 1234);
    message.handles_mut().set(0, Handle::new(0xfeed)).unwrap();
    message.set_file(0, Arc::clone(&file_a)).unwrap();
    message.set_file(1, Arc::clone(&file_b)).unwrap();

    let mut info = peer.lock();
    message.bind_locked(&mut info, &user).unwrap();
    let base = message.slice().unwrap().offset();
    assert_eq!(message.data().offset, base as u64);

    // Payload goes in at offset 0
    let payload = *b"sixteen byte msg";
    info.pool_mut()
        .write_kvec(message.slice().unwrap(), 0, &[IoSlice::new(&payload)])
        .unwrap();

    message.install_handles(&mut info).unwrap();
    message.install_fds(&mut info).unwrap();
    message.publish_locked(&mut info).unwrap();

    // Receiver view of the slice
    let raw = info.pool().read(base, 32).unwrap();
    println!("slice bytes: {:02x?}", raw);
    assert_eq!(&raw[..16], &payload);
    assert_eq!(u64::from_ne_bytes(raw[16..24].try_into().unwrap()), 0xfeed);
    let fd0 = i32::from_ne_bytes(raw[24..28].try_into().unwrap());
    let fd1 = i32::from_ne_bytes(raw[28..32].try_into().unwrap());
    assert_eq!((fd0, fd1), (0, 1));

    let table = Arc::clone(info.fd_table());
    assert_eq!(table.open_count(), 2);
    assert!(Arc::ptr_eq(&table.get(fd0).unwrap(), &file_a));
    assert!(Arc::ptr_eq(&table.get(fd1).unwrap(), &file_b));

    // Consume: unbind refunds the quota, the published slice stays for the receiver
    message.unbind_locked(&mut info);
    assert!(user.usage().is_empty());
    assert!(info.pool().is_published(base));
    info.pool_mut().release_user(base).unwrap();
    assert_eq!(info.pool().allocated(), 0);
    drop(info);

    message.free();
    // Only the test and the receiver's table still reference the files
    assert_eq!(Arc::strong_count(&file_a), 2);
    assert_eq!(Arc::strong_count(&file_b), 2);

    table.close(fd0);
    table.close(fd1);
    assert_eq!(Arc::strong_count(&file_a), 1);
    assert_eq!(Arc::strong_count(&file_b), 1);
}

#[test]
fn test_bind_fails_when_pool_too_small() {
    let peer = PeerBuilder::new().with_id(7).with_pool_size(20).build().unwrap();
    let user = User::with_limits(1000, limits());
    let before = user.usage();

    let mut message = Message::new(16, 2, 1, false).unwrap();
    message.set_file(0, dev_null()).unwrap();
    message.set_file(1, dev_null()).unwrap();

    let mut info = peer.lock();
    assert!(matches!(
        message.bind_locked(&mut info, &user),
        Err(Error::PoolExhausted)
    ));
    assert_eq!(user.usage(), before);
    assert_eq!(info.quota().stats(1000), Default::default());
    drop(info);

    message.free();
}

#[test]
fn test_abandon_after_partial_install() {
    let peer = PeerBuilder::new().with_id(7).with_pool_size(4096).with_max_fds(1).build().unwrap();
    let user = User::new(1000);
    let file = dev_null();

    let mut message = Message::new(64, 2, 2, true).unwrap();
    message.handles_mut().set(0, Handle::new(1)).unwrap();
    message.handles_mut().set(1, Handle::new(2)).unwrap();
    message.set_file(0, Arc::clone(&file)).unwrap();
    message.set_file(1, Arc::clone(&file)).unwrap();

    let mut info = peer.lock();
    message.bind_locked(&mut info, &user).unwrap();
    message.install_handles(&mut info).unwrap();

    // The receiver's table only has room for one descriptor
    assert!(matches!(message.install_fds(&mut info), Err(Error::ResourceExhausted)));

    // Destination gave up: unbind and destroy
    message.unbind_locked(&mut info);
    assert_eq!(info.pool().allocated(), 0);
    assert_eq!(info.fd_table().open_count(), 0);
    drop(info);

    message.free();
    assert!(user.usage().is_empty());
    assert_eq!(Arc::strong_count(&file), 1);
}
