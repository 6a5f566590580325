//! Integration tests for the buffer pool.
//!
//! These tests verify cross-component behavior that unit tests don't cover.

use leafdb::buffer::BufferPool;
use leafdb::storage::page::PageType;
use leafdb::{GlobalPageId, SpaceId, SpaceManager};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

const SPACE: SpaceId = SpaceId(3);

fn create_pool(capacity: usize) -> (BufferPool, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let spaces = Arc::new(SpaceManager::new(dir.path()).unwrap());
    spaces.open_space(SPACE).unwrap();
    (BufferPool::new(spaces, capacity), dir)
}

/// Test data persistence across multiple eviction cycles.
#[test]
fn test_data_persistence_across_evictions() {
    let (pool, _dir) = create_pool(2);

    // 5 pages through a 2-page pool forces evictions
    let mut page_ids = vec![];
    for i in 0u8..5 {
        let mut page = pool.new_page(SPACE, PageType::Data).unwrap();
        assert!(page.add_record(&[i, i.wrapping_mul(3)]));
        page_ids.push(GlobalPageId::new(SPACE, page.page_no()));
        pool.put_page(page, SPACE).unwrap();
    }
    assert!(pool.len() <= 2);

    for (i, &pid) in page_ids.iter().enumerate() {
        let page = pool.get_page(pid).unwrap();
        let i = i as u8;
        assert_eq!(page.record(0), Some(&[i, i.wrapping_mul(3)][..]));
    }
}

/// Test flush and reload across pool instances.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let data = b"persistent!";
    let pid;

    {
        let spaces = Arc::new(SpaceManager::new(dir.path()).unwrap());
        spaces.open_space(SPACE).unwrap();
        let pool = BufferPool::new(spaces, 10);

        let mut page = pool.new_page(SPACE, PageType::Data).unwrap();
        assert!(page.add_record(data));
        pid = GlobalPageId::new(SPACE, page.page_no());
        pool.put_page(page, SPACE).unwrap();
        pool.flush().unwrap();
    }

    {
        let spaces = Arc::new(SpaceManager::new(dir.path()).unwrap());
        spaces.open_space(SPACE).unwrap();
        let pool = BufferPool::new(spaces, 10);

        let page = pool.get_page(pid).unwrap();
        assert_eq!(page.record(0), Some(&data[..]));
        assert!(!page.is_dirty());
    }
}

/// Test concurrent writers to different pages.
#[test]
fn test_concurrent_writers() {
    let (pool, _dir) = create_pool(4);
    let pool = Arc::new(pool);

    let page_ids: Vec<GlobalPageId> = (0..8)
        .map(|_| {
            let page = pool.new_page(SPACE, PageType::Data).unwrap();
            let id = GlobalPageId::new(SPACE, page.page_no());
            pool.put_page(page, SPACE).unwrap();
            id
        })
        .collect();

    let handles: Vec<_> = page_ids
        .iter()
        .enumerate()
        .map(|(i, &pid)| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut page = pool.get_page(pid).unwrap();
                assert!(page.add_record(format!("writer {i}").as_bytes()));
                pool.put_page(page, pid.space_id).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    pool.flush().unwrap();
    assert_eq!(pool.dirty_count(), 0);
    for (i, &pid) in page_ids.iter().enumerate() {
        let page = pool.get_page(pid).unwrap();
        assert_eq!(page.record(0), Some(format!("writer {i}").as_bytes()));
    }
}

/// Freed pages are handed out again and never resurrect stale cached data.
#[test]
fn test_free_page_is_reused() {
    let (pool, _dir) = create_pool(8);

    let mut page = pool.new_page(SPACE, PageType::Data).unwrap();
    assert!(page.add_record(b"old"));
    let pid = GlobalPageId::new(SPACE, page.page_no());
    pool.put_page(page, SPACE).unwrap();

    pool.free_page(pid).unwrap();
    assert!(!pool.contains(pid));

    let reused = pool.new_page(SPACE, PageType::Data).unwrap();
    assert_eq!(reused.page_no(), pid.page_no);
    assert_eq!(reused.record_count(), 0);
}
