fn main() {
    poi_aggregator_lib::run()
}
