use anyhow::Result;

mod common;
use common::create_test_buffer_pool;

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    assert!(page_id > 0);

    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false);

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(page_guard.page_id, page_id);
    }
    buffer_pool.unpin_page(page_id, false);
    Ok(())
}

#[test]
fn test_page_modification_survives_eviction() -> Result<()> {
    // Scenario: pool_size=2, three new pages force the dirty page to disk,
    // and fetching it back returns its bytes.
    let (buffer_pool, _temp_file) = create_test_buffer_pool(2)?;

    let (_, p1) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(p1, false);

    let (page2, p2) = buffer_pool.new_page()?;
    {
        let mut page_guard = page2.write();
        let test_data = b"Dirty page payload";
        page_guard.data[64..64 + test_data.len()].copy_from_slice(test_data);
    }
    buffer_pool.unpin_page(p2, true);

    // Evicts p1 then p2 (LRU order).
    let (_, p3) = buffer_pool.new_page()?;
    assert!(p3 > p2);

    let fetched = buffer_pool.fetch_page(p2)?;
    {
        let page_guard = fetched.read();
        let test_data = b"Dirty page payload";
        assert_eq!(&page_guard.data[64..64 + test_data.len()], test_data);
    }
    buffer_pool.unpin_page(p2, false);
    buffer_pool.unpin_page(p3, false);
    Ok(())
}

#[test]
fn test_all_pinned_fails() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let mut page_ids = Vec::new();
    for _ in 0..3 {
        let (_, page_id) = buffer_pool.new_page()?;
        page_ids.push(page_id);
    }

    // Every frame is pinned; allocation must fail without panicking.
    assert!(buffer_pool.new_page().is_err());
    assert!(buffer_pool.fetch_page(page_ids[0] + 100).is_err());

    // Release one pin and allocation works again.
    buffer_pool.unpin_page(page_ids[0], false);
    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false);

    for &page_id in &page_ids[1..] {
        buffer_pool.unpin_page(page_id, false);
    }
    Ok(())
}

#[test]
fn test_unpin_contract() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(4)?;

    let (_, page_id) = buffer_pool.new_page()?;

    // Non-resident page: no-op success.
    assert!(buffer_pool.unpin_page(page_id + 50, false));

    // First unpin drops the only pin; a second one has nothing to release.
    assert!(buffer_pool.unpin_page(page_id, false));
    assert!(!buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_dirty_hint_is_sticky() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(4)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_guard.data[0] = 0xAB;
    }
    // Two pins: dirty unpin then clean unpin; the dirty flag must survive.
    buffer_pool.fetch_page(page_id)?;
    assert!(buffer_pool.unpin_page(page_id, true));
    assert!(buffer_pool.unpin_page(page_id, false));

    // Force eviction and read back.
    let pool_size = buffer_pool.pool_size();
    let mut more = Vec::new();
    for _ in 0..pool_size {
        let (_, p) = buffer_pool.new_page()?;
        more.push(p);
    }
    let fetched = buffer_pool.fetch_page(page_id)?;
    assert_eq!(fetched.read().data[0], 0xAB);
    buffer_pool.unpin_page(page_id, false);
    for p in more {
        buffer_pool.unpin_page(p, false);
    }
    Ok(())
}

#[test]
fn test_frame_accounting() -> Result<()> {
    let pool_size = 5;
    let (buffer_pool, _temp_file) = create_test_buffer_pool(pool_size)?;

    let (pinned, free, evictable) = buffer_pool.frame_counts();
    assert_eq!((pinned, free, evictable), (0, pool_size, 0));

    let (_, p1) = buffer_pool.new_page()?;
    let (_, p2) = buffer_pool.new_page()?;
    let (pinned, free, evictable) = buffer_pool.frame_counts();
    assert_eq!((pinned, free, evictable), (2, pool_size - 2, 0));

    buffer_pool.unpin_page(p1, false);
    let (pinned, free, evictable) = buffer_pool.frame_counts();
    assert_eq!((pinned, free, evictable), (1, pool_size - 2, 1));

    buffer_pool.unpin_page(p2, false);
    let (pinned, free, evictable) = buffer_pool.frame_counts();
    assert_eq!(pinned + free + evictable, pool_size);
    assert_eq!((pinned, free, evictable), (0, pool_size - 2, 2));
    Ok(())
}

#[test]
fn test_lru_eviction_order() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (_, a) = buffer_pool.new_page()?;
    let (_, b) = buffer_pool.new_page()?;
    let (_, c) = buffer_pool.new_page()?;

    // Unpin in order a, b, c: a is the first victim.
    buffer_pool.unpin_page(a, false);
    buffer_pool.unpin_page(b, false);
    buffer_pool.unpin_page(c, false);

    let (_, d) = buffer_pool.new_page()?;
    // a must be gone; b and c still resident. Re-fetching b should not
    // allocate a new frame, and a comes back from disk via the next victim.
    buffer_pool.fetch_page(b)?;
    buffer_pool.unpin_page(b, false);

    let (pinned, free, evictable) = buffer_pool.frame_counts();
    assert_eq!((pinned, free, evictable), (1, 0, 2));

    buffer_pool.unpin_page(d, false);
    buffer_pool.fetch_page(a)?;
    buffer_pool.unpin_page(a, false);
    Ok(())
}

#[test]
fn test_flush_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let test_data = b"Test Data For Flushing";
        page_guard.data[100..100 + test_data.len()].copy_from_slice(test_data);
    }
    buffer_pool.unpin_page(page_id, true);

    assert!(buffer_pool.flush_page(page_id)?);
    assert!(!buffer_pool.flush_page(page_id + 77)?);

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        let test_data = b"Test Data For Flushing";
        assert_eq!(&page_guard.data[100..100 + test_data.len()], test_data);
    }
    buffer_pool.unpin_page(page_id, false);
    Ok(())
}

#[test]
fn test_flush_all_pages() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let mut page_ids = Vec::new();
    for i in 0..5u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[0] = i;
        }
        buffer_pool.unpin_page(page_id, true);
        page_ids.push(page_id);
    }

    buffer_pool.flush_all_pages()?;

    for (i, &page_id) in page_ids.iter().enumerate() {
        let fetched_page = buffer_pool.fetch_page(page_id)?;
        assert_eq!(fetched_page.read().data[0], i as u8);
        buffer_pool.unpin_page(page_id, false);
    }
    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;

    // Pinned pages refuse deletion.
    assert!(!buffer_pool.delete_page(page_id)?);

    buffer_pool.unpin_page(page_id, false);
    assert!(buffer_pool.delete_page(page_id)?);

    // Deleting a non-resident page succeeds.
    assert!(buffer_pool.delete_page(page_id)?);

    // The freed frame is reusable.
    let (pinned, free, evictable) = buffer_pool.frame_counts();
    assert_eq!((pinned, evictable), (0, 0));
    assert_eq!(free, buffer_pool.pool_size());
    Ok(())
}
