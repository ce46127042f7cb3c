// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Tests for the [`TreeArena`].

use tree_arena::*;

fn children(tree: &TreeArena<char>, id: u64) -> Vec<u64> {
    tree.children(id).collect()
}

#[test]
fn arena_insertions() {
    let mut tree: TreeArena<char> = TreeArena::new();

    // <empty>

    tree.insert_root(1_u64, 'a');
    tree.insert_root(2_u64, 'b');
    assert!(tree.get(1_u64).is_some());

    // >-- 1(a)
    //
    // >-- 2(b)

    tree.insert_child(1_u64, None, 3_u64, 'c');
    tree.insert_child(3_u64, None, 4_u64, 'd');

    // >-- 1(a) -- 3(c) -- 4(d)
    //
    // >-- 2(b)

    assert_eq!(tree.parent_of(4_u64), Some(3));
    assert_eq!(tree.get_id_path(4_u64), vec![4, 3, 1]);
    assert!(
        !tree.is_ancestor_of(2_u64, 4_u64),
        "Child 4 should not be descended from Child 2"
    );
    assert_eq!(tree.roots(), &[1, 2]);
}

#[test]
fn arena_sibling_order() {
    let mut tree: TreeArena<char> = TreeArena::new();
    tree.insert_root(1_u64, 'a');
    tree.insert_child(1_u64, None, 2_u64, 'b');
    tree.insert_child(1_u64, None, 4_u64, 'd');
    tree.insert_child(1_u64, Some(4), 3_u64, 'c');
    tree.insert_child(1_u64, Some(2), 5_u64, 'e');

    // >-- 1(a) -- 5(e)
    //          -- 2(b)
    //          -- 3(c)
    //          -- 4(d)

    assert_eq!(children(&tree, 1), vec![5, 2, 3, 4]);
    assert_eq!(tree.first_child(1_u64), Some(5));
    assert_eq!(tree.last_child(1_u64), Some(4));
    assert_eq!(tree.previous_sibling(3_u64), Some(2));
    assert_eq!(tree.next_sibling(3_u64), Some(4));
    assert_eq!(tree.previous_sibling(5_u64), None);
}

#[test]
fn arena_item_removal() {
    let mut tree: TreeArena<char> = TreeArena::new();
    tree.insert_root(1_u64, 'a');
    tree.insert_child(1_u64, None, 2_u64, 'b');
    tree.insert_child(1_u64, None, 3_u64, 'c');
    tree.insert_child(3_u64, None, 4_u64, 'd');
    tree.insert_child(3_u64, None, 5_u64, 'e');
    tree.insert_child(1_u64, None, 6_u64, 'f');

    // >-- 1(a) -- 2(b)
    //          -- 3(c) -- 4(d)
    //                  -- 5(e)
    //          -- 6(f)

    let removed = tree.remove(3_u64);
    assert_eq!(removed, Some('c'), "Expect removal of node 3");

    // Children of the removed node take its place.
    assert_eq!(children(&tree, 1), vec![2, 4, 5, 6]);
    assert_eq!(tree.parent_of(5_u64), Some(1));

    let removed = tree.remove_subtree(1_u64);
    assert_eq!(
        removed.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![1, 2, 4, 5, 6]
    );
    assert!(tree.is_empty());
    assert!(tree.roots().is_empty());
}

#[test]
fn arena_detach_and_reattach() {
    let mut tree: TreeArena<char> = TreeArena::new();
    tree.insert_root(1_u64, 'a');
    tree.insert_child(1_u64, None, 2_u64, 'b');
    tree.insert_child(2_u64, None, 3_u64, 'c');
    tree.insert_child(1_u64, None, 4_u64, 'd');

    tree.detach(2_u64);
    assert_eq!(children(&tree, 1), vec![4]);
    assert_eq!(tree.roots(), &[1, 2]);
    // The detached subtree stays intact.
    assert_eq!(tree.parent_of(3_u64), Some(2));

    tree.attach(2_u64, 4_u64, None);
    assert_eq!(tree.roots(), &[1]);
    assert_eq!(tree.get_id_path(3_u64), vec![3, 2, 4, 1]);
}

#[test]
fn arena_descendants_pre_order() {
    let mut tree: TreeArena<char> = TreeArena::new();
    tree.insert_root(1_u64, 'a');
    tree.insert_child(1_u64, None, 2_u64, 'b');
    tree.insert_child(2_u64, None, 3_u64, 'c');
    tree.insert_child(2_u64, None, 4_u64, 'd');
    tree.insert_child(1_u64, None, 5_u64, 'e');
    tree.insert_root(6_u64, 'f');

    assert_eq!(tree.descendants(1_u64).collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    assert_eq!(tree.descendants(2_u64).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(tree.descendants(5_u64).count(), 0);
}

#[test]
#[should_panic(expected = "Key already present")]
fn arena_duplicate_insertion() {
    let mut tree: TreeArena<char> = TreeArena::new();
    tree.insert_root(1_u64, 'a');
    tree.insert_child(1_u64, None, 1_u64, 'b');
}

#[test]
#[should_panic(expected = "under its own subtree")]
fn arena_attach_into_own_subtree() {
    let mut tree: TreeArena<char> = TreeArena::new();
    tree.insert_root(1_u64, 'a');
    tree.insert_child(1_u64, None, 2_u64, 'b');
    tree.insert_root(3_u64, 'c');
    tree.detach(1_u64);
    tree.attach(1_u64, 2_u64, None);
}
