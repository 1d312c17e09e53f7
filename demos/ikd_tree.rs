use anyhow::Result;
use ikd::geometry::{Aabb, Point3D};
use ikd::ikd_tree::IkdTree;

fn main() -> Result<()> {
    let mut tree: IkdTree<Point3D<u32>> = IkdTree::new(0.5, 0.7, 0.2, 10)?;

    // Build the initial map from a coarse grid of points.
    let mut points = Vec::new();
    let mut id = 0u32;
    for x in -5..=5 {
        for y in -5..=5 {
            for z in -2..=2 {
                points.push(Point3D::new(x as f64, y as f64, z as f64, Some(id)));
                id += 1;
            }
        }
    }
    tree.build(points);
    println!("Built tree with {} points", tree.valid_count());

    // Query the tree for the 5 nearest neighbors of a point.
    let query = Point3D::new(0.3, -0.2, 0.1, None);
    let mut nearest = Vec::new();
    tree.knn(&query, 5, &mut nearest);
    println!("5 nearest neighbors to {:?}:", query);
    for point in &nearest {
        println!("  {:?} at squared distance {:.3}", point, query.distance_sq(point));
    }

    // Incremental, voxel-downsampled insertion: the first point lands in an
    // occupied voxel and competes with the resident for the spot.
    tree.insert(vec![
        Point3D::new(0.05, -0.05, 0.05, Some(9000)),
        Point3D::new(7.5, 7.5, 0.0, Some(9001)),
    ]);
    println!("After insertion: {} points", tree.valid_count());

    // Carve a box out of the map.
    tree.delete_boxes(&[Aabb::new([-1.5, -1.5, -1.5], [1.5, 1.5, 1.5])]);
    println!("After box deletion: {} points", tree.valid_count());

    tree.knn(&query, 5, &mut nearest);
    println!("5 nearest neighbors after the deletion:");
    for point in &nearest {
        println!("  {:?} at squared distance {:.3}", point, query.distance_sq(point));
    }

    let mut remaining = Vec::new();
    tree.flatten(&mut remaining);
    println!(
        "{} live points remain, {} were physically reclaimed, {} rebuilds ran",
        remaining.len(),
        tree.take_removed().len(),
        tree.rebuild_count()
    );
    Ok(())
}
