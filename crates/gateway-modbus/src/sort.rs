// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tag sort / batching (§4.8).
//!
//! Packs a group's points into the fewest read commands such that each
//! command covers one `(slave_id, area)`, spans a contiguous register
//! range, and implies no more than `cap_bytes` of response payload.
//! Points are assigned leftmost-fitting; commands are emitted in
//! `(slave_id, area, start_address)` order.

use crate::point::{Area, Point};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ReadCommand {
    pub slave_id: u8,
    pub area: Area,
    pub start_address: u16,
    pub register_count: u16,
    pub points: Vec<Point>,
}

fn span_bytes(area: Area, register_span: u32) -> u32 {
    if area.is_bit_area() {
        (register_span + 7) / 8
    } else {
        register_span * 2
    }
}

/// `Ord` key for grouping/ordering that doesn't require `Area: Ord`.
fn area_rank(area: Area) -> u8 {
    match area {
        Area::Coil => 0,
        Area::DiscreteInput => 1,
        Area::InputRegister => 2,
        Area::HoldingRegister => 3,
    }
}

pub fn tag_sort(points: &[Point], cap_bytes: u32) -> Vec<ReadCommand> {
    let mut groups: BTreeMap<(u8, u8), Vec<Point>> = BTreeMap::new();
    for p in points {
        groups.entry((p.slave_id, area_rank(p.area))).or_default().push(p.clone());
    }

    let mut commands = Vec::new();
    for ((slave_id, _rank), mut group_points) in groups {
        group_points.sort_by_key(|p| p.start_address);
        let area = group_points[0].area;

        let mut current_start = group_points[0].start_address;
        let mut current_end = group_points[0].end_address();
        let mut current_points = vec![group_points[0].clone()];

        for p in &group_points[1..] {
            let candidate_end = current_end.max(p.end_address());
            let span = (candidate_end - current_start) as u32;
            if span_bytes(area, span) <= cap_bytes {
                current_end = candidate_end;
                current_points.push(p.clone());
            } else {
                commands.push(ReadCommand {
                    slave_id,
                    area,
                    start_address: current_start,
                    register_count: current_end - current_start,
                    points: std::mem::take(&mut current_points),
                });
                current_start = p.start_address;
                current_end = p.end_address();
                current_points.push(p.clone());
            }
        }
        commands.push(ReadCommand {
            slave_id,
            area,
            start_address: current_start,
            register_count: current_end - current_start,
            points: current_points,
        });
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{DataType, Endianness};

    fn uint16_at(name: &str, addr: u16) -> Point {
        Point {
            name: name.to_string(),
            slave_id: 1,
            area: Area::HoldingRegister,
            start_address: addr,
            data_type: DataType::Uint16,
            endianness: Endianness::Abcd,
            readable: true,
            writable: true,
        }
    }

    #[test]
    fn maximal_packing_scenario() {
        let points: Vec<Point> = [0u16, 1, 2, 5, 6, 1000]
            .iter()
            .enumerate()
            .map(|(i, &addr)| uint16_at(&format!("t{i}"), addr))
            .collect();

        let commands = tag_sort(&points, 240);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].start_address, 0);
        assert_eq!(commands[0].register_count, 7);
        assert_eq!(commands[1].start_address, 1000);
        assert_eq!(commands[1].register_count, 1);
    }

    #[test]
    fn small_cap_yields_one_register_per_command() {
        let points: Vec<Point> = [0u16, 1, 2].iter().map(|&a| uint16_at("t", a)).collect();
        // cap smaller than one register (1 byte < 2 bytes) forces singletons.
        let commands = tag_sort(&points, 1);
        assert_eq!(commands.len(), 3);
        for c in &commands {
            assert_eq!(c.register_count, 1);
        }
    }

    #[test]
    fn commands_cover_every_point_exactly_once() {
        let points: Vec<Point> = [0u16, 3, 4, 50].iter().map(|&a| uint16_at("t", a)).collect();
        let commands = tag_sort(&points, 240);
        let total: usize = commands.iter().map(|c| c.points.len()).sum();
        assert_eq!(total, points.len());
    }

    #[test]
    fn different_slaves_never_share_a_command() {
        let mut p1 = uint16_at("a", 0);
        let mut p2 = uint16_at("b", 1);
        p1.slave_id = 1;
        p2.slave_id = 2;
        let commands = tag_sort(&[p1, p2], 240);
        assert_eq!(commands.len(), 2);
    }
}
