mod helpers;

#[cfg(test)]
mod tests {
    use super::helpers::Anyhow;
    use ikd::geometry::{Aabb, Point3D};
    use ikd::ikd_tree::IkdTree;

    #[test]
    fn test_ikdtree_serialization() -> Anyhow {
        let mut tree: IkdTree<Point3D<String>> = IkdTree::new(0.5, 0.7, 0.2, 10)?;
        tree.build(vec![
            Point3D::new(1.0, 2.0, 3.0, Some("a".to_string())),
            Point3D::new(4.0, 5.0, 6.0, Some("b".to_string())),
            Point3D::new(-1.0, -2.0, -3.0, Some("c".to_string())),
        ]);
        tree.insert(vec![Point3D::new(7.0, 8.0, 9.0, Some("d".to_string()))]);

        let encoded: Vec<u8> = bincode::serialize(&tree)?;
        let decoded: IkdTree<Point3D<String>> = bincode::deserialize(&encoded[..])?;

        let query = Point3D::new(2.0, 3.0, 4.0, None);
        let mut expected = Vec::new();
        let mut got = Vec::new();
        tree.knn(&query, 2, &mut expected);
        decoded.knn(&query, 2, &mut got);
        assert_eq!(expected, got);

        tree.flatten(&mut expected);
        decoded.flatten(&mut got);
        assert_eq!(expected, got);
        Ok(())
    }

    #[test]
    fn test_ikdtree_serialization_preserves_lazy_deletions() -> Anyhow {
        let mut tree: IkdTree<Point3D<String>> = IkdTree::new(0.9, 0.7, 0.2, 10)?;
        tree.build(
            (0..20)
                .map(|i| Point3D::new(i as f64, 0.0, 0.0, Some(i.to_string())))
                .collect(),
        );
        tree.delete_boxes(&[Aabb::new([-0.5, -0.5, -0.5], [9.5, 0.5, 0.5])]);

        let encoded: Vec<u8> = bincode::serialize(&tree)?;
        let decoded: IkdTree<Point3D<String>> = bincode::deserialize(&encoded[..])?;

        assert_eq!(tree.valid_count(), decoded.valid_count());
        let mut expected = Vec::new();
        let mut got = Vec::new();
        tree.flatten(&mut expected);
        decoded.flatten(&mut got);
        assert_eq!(expected, got);
        Ok(())
    }
}
